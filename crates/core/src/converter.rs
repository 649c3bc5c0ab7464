//! Conversion orchestration.
//!
//! Responsibilities:
//! - Forward: classify, parse, map every segment occurrence, assemble the Bundle, optionally
//!   validate
//! - Reverse: extract resources by type, optionally validate, map, build the message with a
//!   generated header
//! - Keep fatal errors (returned as [`ConversionError`]) apart from warnings (returned with
//!   the result)
//!
//! Notes:
//! - A [`Converter`] holds only immutable shared state, so one instance can serve many
//!   threads.
//! - Conversions are synchronous and request-local.

use crate::config::ConverterConfig;
use crate::dispatch::{InboundMessageType, OutboundMessageType};
use crate::engine::{apply_forward, apply_reverse, FieldAssignment, Mapped};
use crate::error::{MappingWarning, Stage, WarningKind};
use crate::rules::{ForwardRuleSet, MappingConfig};
use crate::transform::{FieldValue, Transform};
use crate::{ConversionError, ConversionResult};
use fhir::datatypes::Identifier;
use fhir::{
    assemble, extract_by_type, Bundle, FhirError, Resource, ResourceType, ResourceValidator,
};
use hl7v2::{parser, Delimiters, FieldPath, MessageBuilder, Terser};
use std::sync::Arc;

/// Control ids are cut to the HL7 v2.5 length of MSH-10.
const CONTROL_ID_LEN: usize = 20;

/// Result of an HL7 to FHIR conversion.
#[derive(Clone, Debug)]
pub struct FhirConversion {
    pub message_type: InboundMessageType,
    pub bundle: Bundle,
    pub warnings: Vec<MappingWarning>,
}

/// Result of a FHIR to HL7 conversion.
#[derive(Clone, Debug)]
pub struct Hl7Conversion {
    pub message_type: OutboundMessageType,
    pub control_id: String,
    /// Segments terminated by CR.
    pub message: String,
    pub warnings: Vec<MappingWarning>,
}

/// Steps of a conversion, logged as they are entered. A failure at any step is the
/// returned error.
#[derive(Clone, Copy, Debug)]
enum ConversionState {
    ReceivedRaw,
    Parsed,
    Mapped,
    Assembled,
    Validated,
    ReceivedResources,
    Extracted,
    Built,
    Done,
}

impl ConversionState {
    fn enter(self) {
        tracing::debug!(state = ?self, "conversion step");
    }
}

// ============================================================================
// Converter
// ============================================================================

/// HL7 v2 ⇄ FHIR R4 converter.
#[derive(Clone)]
pub struct Converter {
    rules: Arc<MappingConfig>,
    config: Arc<ConverterConfig>,
    validator: Option<Arc<dyn ResourceValidator>>,
}

impl Converter {
    pub fn new(rules: Arc<MappingConfig>, config: Arc<ConverterConfig>) -> Self {
        Self {
            rules,
            config,
            validator: None,
        }
    }

    /// Validate every produced (forward) or consumed (reverse) resource with `validator`.
    pub fn with_validator(mut self, validator: Arc<dyn ResourceValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn rules(&self) -> &MappingConfig {
        &self.rules
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Convert one HL7 v2 message into a collection Bundle.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] if the message type is unsupported, the message cannot be
    /// parsed, or the rule table writes conflicting shapes.
    pub fn convert_to_fhir(&self, raw: &str) -> ConversionResult<FhirConversion> {
        to_fhir(&self.rules, self.validator.as_deref(), raw)
    }

    /// Convert a FHIR resource or Bundle into one HL7 v2 message of `message_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] if the input is not a FHIR resource, a Patient is required
    /// and missing, or the message cannot be built.
    pub fn convert_to_hl7(
        &self,
        json: &str,
        message_type: OutboundMessageType,
    ) -> ConversionResult<Hl7Conversion> {
        to_hl7(
            &self.rules,
            &self.config,
            self.validator.as_deref(),
            json,
            message_type,
        )
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

/// Convert with default header configuration and no validator.
pub fn convert_to_fhir(raw: &str, rules: &MappingConfig) -> ConversionResult<FhirConversion> {
    to_fhir(rules, None, raw)
}

/// Convert with default header configuration and no validator.
pub fn convert_to_hl7(
    json: &str,
    message_type: OutboundMessageType,
    rules: &MappingConfig,
) -> ConversionResult<Hl7Conversion> {
    to_hl7(rules, &ConverterConfig::default(), None, json, message_type)
}

// ============================================================================
// Forward
// ============================================================================

fn to_fhir(
    rules: &MappingConfig,
    validator: Option<&dyn ResourceValidator>,
    raw: &str,
) -> ConversionResult<FhirConversion> {
    ConversionState::ReceivedRaw.enter();
    let (message_type, delimiters) = InboundMessageType::sniff(raw)?;
    let message =
        parser::parse(raw, &delimiters).map_err(|e| ConversionError::at(Stage::Parse, e))?;

    ConversionState::Parsed.enter();
    let terser = Terser::new(&message);
    let mut warnings = Vec::new();

    let patient = map_first(&rules.patient.forward, &terser, &mut warnings)?;
    let encounter = map_first(&rules.encounter.forward, &terser, &mut warnings)?;
    let observation_rules = &rules.observation.forward;
    let mut observations = Vec::new();
    for occurrence in 0..terser.segment_count(&observation_rules.segment) {
        let mapped = apply_forward(observation_rules, &terser, occurrence)
            .map_err(|e| ConversionError::at(Stage::Map, e))?;
        observations.push(collect(mapped, &mut warnings));
    }

    ConversionState::Mapped.enter();
    let mut bundle = assemble(patient, encounter, observations);
    bundle.identifier = header_identifier(&terser);
    match Transform::DateTime.forward(&terser, &FieldPath::new("MSH", 7).with_component(1)) {
        Ok(Some(serde_json::Value::String(timestamp))) => bundle.timestamp = Some(timestamp),
        Ok(_) => {}
        Err(e) => warnings.push(MappingWarning::new(
            WarningKind::InvalidValue,
            "MSH-7-1 -> Bundle.timestamp",
            e.to_string(),
        )),
    }

    ConversionState::Assembled.enter();
    if let Some(validator) = validator {
        for resource in bundle.resources() {
            validate(validator, resource, &mut warnings);
        }
        ConversionState::Validated.enter();
    }

    ConversionState::Done.enter();
    tracing::info!(
        message_type = %message_type,
        patients = bundle.count(ResourceType::Patient),
        encounters = bundle.count(ResourceType::Encounter),
        observations = bundle.count(ResourceType::Observation),
        warnings = warnings.len(),
        "converted HL7 message to FHIR"
    );

    Ok(FhirConversion {
        message_type,
        bundle,
        warnings,
    })
}

/// Map the first occurrence of a segment that should appear at most once.
fn map_first(
    rules: &ForwardRuleSet,
    terser: &Terser<'_>,
    warnings: &mut Vec<MappingWarning>,
) -> ConversionResult<Option<Resource>> {
    let count = terser.segment_count(&rules.segment);
    if count == 0 {
        return Ok(None);
    }
    if count > 1 {
        warnings.push(MappingWarning::new(
            WarningKind::Structure,
            &rules.segment,
            format!("message has {count} {} segments; only the first is mapped", rules.segment),
        ));
    }

    let mapped =
        apply_forward(rules, terser, 0).map_err(|e| ConversionError::at(Stage::Map, e))?;
    Ok(Some(collect(mapped, warnings)))
}

fn collect<T>(mapped: Mapped<T>, warnings: &mut Vec<MappingWarning>) -> T {
    warnings.extend(mapped.warnings);
    mapped.value
}

fn header_identifier(terser: &Terser<'_>) -> Option<Identifier> {
    let control_id = terser.get(&FieldPath::new("MSH", 10));
    let control_id = control_id.trim();
    (!control_id.is_empty()).then(|| Identifier {
        value: Some(control_id.to_string()),
        ..Default::default()
    })
}

// ============================================================================
// Reverse
// ============================================================================

fn to_hl7(
    rules: &MappingConfig,
    config: &ConverterConfig,
    validator: Option<&dyn ResourceValidator>,
    json: &str,
    message_type: OutboundMessageType,
) -> ConversionResult<Hl7Conversion> {
    ConversionState::ReceivedResources.enter();
    let input = Resource::parse(json).map_err(|e| ConversionError::at(Stage::Extract, e))?;
    let extract = |resource_type| {
        extract_by_type(&input, resource_type).map_err(|e| ConversionError::at(Stage::Extract, e))
    };
    let patients = extract(ResourceType::Patient)?;
    let encounters = extract(ResourceType::Encounter)?;
    let observations = extract(ResourceType::Observation)?;

    let mut warnings = Vec::new();
    if patients.is_empty() {
        if message_type.requires_patient() {
            return Err(ConversionError::at(
                Stage::Extract,
                FhirError::InvalidInput(format!("{message_type} requires a Patient resource")),
            ));
        }
        warnings.push(MappingWarning::new(
            WarningKind::Structure,
            "PID",
            "input has no Patient resource",
        ));
    }
    for (found, name, segment) in [
        (patients.len(), "Patient", "PID"),
        (encounters.len(), "Encounter", "PV1"),
    ] {
        if found > 1 {
            warnings.push(MappingWarning::new(
                WarningKind::Structure,
                segment,
                format!("input has {found} {name} resources; only the first is mapped"),
            ));
        }
    }
    if encounters.is_empty() && message_type == OutboundMessageType::AdtA01 {
        warnings.push(MappingWarning::new(
            WarningKind::Structure,
            "PV1",
            "input has no Encounter resource; PV1 is left empty",
        ));
    }

    ConversionState::Extracted.enter();
    if let Some(validator) = validator {
        for resource in patients.iter().chain(&encounters).chain(&observations) {
            validate(validator, resource, &mut warnings);
        }
    }

    let delimiters = Delimiters::default();
    let mut assignments: Vec<FieldAssignment> = Vec::new();
    if let Some(patient) = patients.first() {
        let mapped = apply_reverse(&rules.patient.reverse, patient, 0, &delimiters);
        assignments.extend(collect(mapped, &mut warnings));
    }
    if let Some(encounter) = encounters.first() {
        let mapped = apply_reverse(&rules.encounter.reverse, encounter, 0, &delimiters);
        assignments.extend(collect(mapped, &mut warnings));
    }
    let observation_segment = &rules.observation.reverse.segment;
    for (occurrence, observation) in observations.iter().enumerate() {
        let value = observation.as_value();
        if value.get("valueQuantity").is_some() && value.get("valueString").is_some() {
            let location = observation
                .reference()
                .unwrap_or_else(|| format!("{observation_segment}({occurrence})"));
            warnings.push(MappingWarning::new(
                WarningKind::Structure,
                format!("{location}.valueString"),
                "valueQuantity is present; valueString is not mapped",
            ));
        }
        assignments.push(FieldAssignment {
            path: FieldPath::new(observation_segment.as_str(), 1).with_occurrence(occurrence),
            value: FieldValue::Literal((occurrence + 1).to_string()),
        });
        let mapped = apply_reverse(&rules.observation.reverse, observation, occurrence, &delimiters);
        assignments.extend(collect(mapped, &mut warnings));
    }

    ConversionState::Mapped.enter();
    let control_id: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(CONTROL_ID_LEN)
        .collect();
    let now = chrono::Local::now().format("%Y%m%d%H%M%S%z").to_string();

    let build = |e: hl7v2::Hl7Error| ConversionError::at(Stage::Build, e);
    let mut builder = MessageBuilder::new(delimiters, message_type.template());
    write_header(&mut builder, config, message_type, &control_id, &now).map_err(build)?;
    if message_type == OutboundMessageType::AdtA01 {
        builder.ensure_segment(&rules.encounter.reverse.segment, 0);
    }
    for assignment in &assignments {
        assignment.apply(&mut builder).map_err(build)?;
    }
    let message = builder.build();

    ConversionState::Built.enter();
    ConversionState::Done.enter();
    tracing::info!(
        message_type = %message_type,
        control_id = %control_id,
        observations = observations.len(),
        warnings = warnings.len(),
        "converted FHIR resources to HL7"
    );

    Ok(Hl7Conversion {
        message_type,
        control_id,
        message,
        warnings,
    })
}

fn write_header(
    builder: &mut MessageBuilder,
    config: &ConverterConfig,
    message_type: OutboundMessageType,
    control_id: &str,
    now: &str,
) -> hl7v2::Hl7Result<()> {
    let msh = |field| FieldPath::new("MSH", field);
    builder
        .set_field(&msh(3), config.sending_application())?
        .set_field(&msh(4), config.sending_facility())?
        .set_field(&msh(5), config.receiving_application())?
        .set_field(&msh(6), config.receiving_facility())?
        .set_field(&msh(7), now)?
        .set_encoded(&msh(9), message_type.message_type_field())?
        .set_field(&msh(10), control_id)?
        .set_field(&msh(11), config.processing_id())?
        .set_field(&msh(12), config.version())?;

    if message_type == OutboundMessageType::AdtA01 {
        builder
            .set_field(&FieldPath::new("EVN", 1), message_type.trigger())?
            .set_field(&FieldPath::new("EVN", 2), now)?;
    }
    Ok(())
}

// ============================================================================
// Validation
// ============================================================================

fn validate(
    validator: &dyn ResourceValidator,
    resource: &Resource,
    warnings: &mut Vec<MappingWarning>,
) {
    let outcome = validator.validate(resource.as_value());
    let subject = resource
        .reference()
        .unwrap_or_else(|| resource.resource_type_name().to_string());
    for issue in outcome.issues {
        warnings.push(MappingWarning::new(
            WarningKind::Validation,
            format!("{subject}.{}", issue.path),
            format!("{}: {}", issue.severity.as_str(), issue.message),
        ));
    }
}
