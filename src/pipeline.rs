//! End-to-end driver: text → syntax tree → network → violations → codec
//! plans → generated sources.
//!
//! [`run`] never stops on collectable problems. Everything found is returned
//! in [`PipelineOutput::diagnostics`]; only a parse failure of the whole file
//! leaves the output without a network.

use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::codec::plan::{MessagePlan, plan_message};
use crate::codegen::{
    CTarget, CTargetOptions, GeneratedSource, RustTarget, RustTargetOptions, Target, generate,
};
use crate::core::cursor::Parsed;
use crate::core::strings::decode_text;
use crate::normalize::{IntoNetwork, normalize};
use crate::types::diagnostics::Diagnostics;
use crate::types::errors::{GenerationError, ParseError, PlanError};
use crate::types::network::Network;
use crate::validate::validate;

/// Input format of [`run`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[cfg(feature = "dbc")]
    Dbc,
    #[cfg(feature = "ldf")]
    Ldf,
    #[cfg(feature = "ncf")]
    Ncf,
}

impl Format {
    /// Format conventionally stored under file extension `ext` (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_ascii_lowercase().as_str() {
            #[cfg(feature = "dbc")]
            "dbc" => Some(Format::Dbc),
            #[cfg(feature = "ldf")]
            "ldf" => Some(Format::Ldf),
            #[cfg(feature = "ncf")]
            "ncf" => Some(Format::Ncf),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            #[cfg(feature = "dbc")]
            Format::Dbc => f.write_str("DBC"),
            #[cfg(feature = "ldf")]
            Format::Ldf => f.write_str("LDF"),
            #[cfg(feature = "ncf")]
            Format::Ncf => f.write_str("NCF"),
        }
    }
}

/// Code generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Rust,
    C,
}

/// Pipeline settings, loadable from any serde format.
///
/// ```
/// use buscodec::pipeline::{PipelineOptions, TargetKind};
///
/// let options: PipelineOptions =
///     serde_json::from_str(r#"{ "targets": ["c"], "c": { "max_integer_bits": 32 } }"#).unwrap();
/// assert_eq!(options.targets, vec![TargetKind::C]);
/// assert!(options.generate_on_violations);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Backends to render, in output order.
    pub targets: Vec<TargetKind>,
    /// Plan and generate even when the validator reported violations.
    pub generate_on_violations: bool,
    /// Plan and render messages on the rayon pool (`parallel` feature).
    pub parallel: bool,
    pub rust: RustTargetOptions,
    pub c: CTargetOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            targets: vec![TargetKind::Rust, TargetKind::C],
            generate_on_violations: true,
            parallel: true,
            rust: RustTargetOptions::default(),
            c: CTargetOptions::default(),
        }
    }
}

/// Everything a pipeline run produced.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    /// `None` when the file could not be parsed at all.
    pub network: Option<Network>,
    pub diagnostics: Diagnostics,
    /// Codec plans in message order. Empty when planning was skipped.
    pub plans: Vec<Result<MessagePlan, PlanError>>,
    /// One entry per target that generated successfully.
    pub sources: Vec<GeneratedSource>,
}

impl PipelineOutput {
    pub fn source(&self, target: &str) -> Option<&GeneratedSource> {
        self.sources.iter().find(|s| s.target == target)
    }
}

fn lower<A: IntoNetwork>(
    parsed: Result<Parsed<A>, ParseError>,
    diagnostics: &mut Diagnostics,
) -> Option<Network> {
    match parsed {
        Ok(parsed) => {
            diagnostics.merge(parsed.diagnostics);
            Some(normalize(&parsed.ast, diagnostics))
        }
        Err(e) => {
            warn!("giving up on input: {e}");
            diagnostics.push(e);
            None
        }
    }
}

fn build_network(text: &str, format: Format, diagnostics: &mut Diagnostics) -> Option<Network> {
    match format {
        #[cfg(feature = "dbc")]
        Format::Dbc => lower(crate::dbc::parse_str(text), diagnostics),
        #[cfg(feature = "ldf")]
        Format::Ldf => lower(crate::ldf::parse_str(text), diagnostics),
        #[cfg(feature = "ncf")]
        Format::Ncf => lower(crate::ncf::parse_str(text), diagnostics),
    }
}

#[cfg(feature = "parallel")]
fn plan_all(network: &Network, parallel: bool) -> Vec<Result<MessagePlan, PlanError>> {
    use rayon::prelude::*;

    if parallel {
        network
            .messages_order
            .par_iter()
            .map(|&mk| plan_message(network, mk))
            .collect()
    } else {
        network
            .messages_order
            .iter()
            .map(|&mk| plan_message(network, mk))
            .collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn plan_all(network: &Network, _parallel: bool) -> Vec<Result<MessagePlan, PlanError>> {
    network
        .messages_order
        .iter()
        .map(|&mk| plan_message(network, mk))
        .collect()
}

#[cfg(feature = "parallel")]
fn render(
    network: &Network,
    plans: &[Result<MessagePlan, PlanError>],
    target: &dyn Target,
    parallel: bool,
) -> Result<GeneratedSource, GenerationError> {
    use crate::codegen::{assemble, render_named, type_idents};
    use rayon::prelude::*;

    if !parallel {
        return generate(network, plans, target);
    }
    let planned: Vec<&MessagePlan> = plans.iter().filter_map(|p| p.as_ref().ok()).collect();
    let idents = type_idents(target, planned.iter().copied());
    let rendered = planned
        .into_par_iter()
        .zip(idents)
        .map(|(plan, ident)| {
            render_named(network, plan, ident, target).map(|text| (plan.name.clone(), text))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let failed: Vec<&PlanError> = plans.iter().filter_map(|p| p.as_ref().err()).collect();
    Ok(assemble(network, target, rendered, &failed))
}

#[cfg(not(feature = "parallel"))]
fn render(
    network: &Network,
    plans: &[Result<MessagePlan, PlanError>],
    target: &dyn Target,
    _parallel: bool,
) -> Result<GeneratedSource, GenerationError> {
    generate(network, plans, target)
}

/// Runs every stage on `text`.
pub fn run(text: &str, format: Format, options: &PipelineOptions) -> PipelineOutput {
    let mut output = PipelineOutput::default();
    let Some(network) = build_network(text, format, &mut output.diagnostics) else {
        return output;
    };

    let violations = validate(&network);
    let violation_count = violations.len();
    for violation in violations {
        output.diagnostics.push(violation);
    }
    info!(
        "{format} network '{}': {} messages, {} signals, {} violations",
        network.name,
        network.messages.len(),
        network.signals.len(),
        violation_count
    );

    if violation_count > 0 && !options.generate_on_violations {
        info!("skipping code generation because of {violation_count} violations");
        output.network = Some(network);
        return output;
    }

    output.plans = plan_all(&network, options.parallel);
    for err in output.plans.iter().filter_map(|p| p.as_ref().err()) {
        warn!("{err}");
        output.diagnostics.push(err.clone());
    }

    for kind in &options.targets {
        let target: Box<dyn Target> = match kind {
            TargetKind::Rust => Box::new(RustTarget::new(options.rust.clone())),
            TargetKind::C => Box::new(CTarget::new(options.c.clone())),
        };
        match render(&network, &output.plans, target.as_ref(), options.parallel) {
            Ok(source) => {
                info!(
                    "generated {} for target {}: {} messages, {} omitted",
                    source.file_name,
                    source.target,
                    source.messages.len(),
                    source.omitted.len()
                );
                output.sources.push(source);
            }
            Err(e) => {
                warn!("{e}");
                output.diagnostics.push(e);
            }
        }
    }

    output.network = Some(network);
    output
}

/// [`run`] over raw file content, decoded with [`decode_text`].
pub fn run_bytes(bytes: &[u8], format: Format, options: &PipelineOptions) -> PipelineOutput {
    run(&decode_text(bytes), format, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::diagnostics::Diagnostic;
    use crate::types::errors::ReferenceKind;
    use crate::validate::ViolationKind;

    #[cfg(feature = "ldf")]
    const LDF_MISSING_FRAME: &str = r#"
LIN_description_file;
LIN_protocol_version = "2.1";
LIN_language_version = "2.1";
LIN_speed = 19.2 kbps;

Nodes {
  Master: CEM, 5 ms, 0.1 ms;
  Slaves: LSM;
}

Signals {
  LightReq: 2, 0, CEM, LSM;
  Switch: 8, 0, LSM, CEM;
}

Frames {
  CEM_Frm1: 0x01, CEM, 1 {
    LightReq, 0;
  }
  LSM_Frm1: 0x02, LSM, 1 {
    Switch, 0;
  }
}

Schedule_tables {
  Normal {
    CEM_Frm1 delay 15 ms;
    LSM_Frm1 delay 15 ms;
    Ghost_Frm delay 15 ms;
  }
}
"#;

    #[cfg(feature = "dbc")]
    const DBC_SPEED: &str = r#"
VERSION ""

BU_: ECU

BO_ 256 Speed: 8 ECU
 SG_ VehicleSpeed : 0|16@1+ (0.1,0) [0|6553.5] "km/h" Vector__XXX

BO_ 512 Broken: 1 ECU
 SG_ TooWide : 0|16@1+ (1,0) [0|0] "" Vector__XXX
"#;

    #[cfg(feature = "ldf")]
    #[test]
    fn test_missing_schedule_frame_does_not_block_generation() {
        let out = run(LDF_MISSING_FRAME, Format::Ldf, &PipelineOptions::default());

        let missing: Vec<_> = out.diagnostics.reference_errors().collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].kind, ReferenceKind::Message);
        assert_eq!(missing[0].name, "Ghost_Frm");

        assert_eq!(out.sources.len(), 2);
        for source in &out.sources {
            assert_eq!(source.messages, vec!["CEM_Frm1", "LSM_Frm1"]);
            assert!(source.omitted.is_empty());
        }
        assert!(out.source("rust").unwrap().text.contains("pub struct CemFrm1 {"));
        assert!(out.source("c").unwrap().text.contains("} lsm_frm1_t;"));
    }

    #[cfg(feature = "ldf")]
    #[test]
    fn test_violations_can_stop_generation() {
        let options = PipelineOptions {
            generate_on_violations: false,
            ..Default::default()
        };
        let out = run(LDF_MISSING_FRAME, Format::Ldf, &options);
        assert!(out.network.is_some());
        assert!(out.plans.is_empty());
        assert!(out.sources.is_empty());
    }

    #[cfg(feature = "dbc")]
    #[test]
    fn test_failed_plan_is_reported_and_omitted() {
        for parallel in [false, true] {
            let options = PipelineOptions {
                targets: vec![TargetKind::Rust],
                parallel,
                ..Default::default()
            };
            let out = run(DBC_SPEED, Format::Dbc, &options);

            let kinds: Vec<ViolationKind> = out
                .diagnostics
                .iter()
                .filter_map(|d| match d {
                    Diagnostic::Violation(v) => Some(v.kind()),
                    _ => None,
                })
                .collect();
            assert_eq!(kinds, vec![ViolationKind::SignalOutOfFrame]);
            assert!(out.diagnostics.iter().any(|d| matches!(d, Diagnostic::Plan(_))));

            assert_eq!(out.plans.len(), 2);
            let rust = out.source("rust").unwrap();
            assert_eq!(rust.messages, vec!["Speed"]);
            assert_eq!(rust.omitted, vec!["Broken"]);

            let speed = out.plans[0].as_ref().unwrap();
            let (frame, _) = speed.encode_frame(&[("VehicleSpeed", 25.5)]);
            assert_eq!(&frame[..2], &[0xFF, 0x00]);
        }
    }

    #[cfg(feature = "dbc")]
    #[test]
    fn test_long_frame_is_planned_without_overflow() {
        let text = "BU_: ECU\nBO_ 256 Huge: 9000 ECU\n SG_ Tail : 65530|16@1+ (1,0) [0|65535] \"\" Vector__XXX\n";
        let options = PipelineOptions {
            targets: vec![TargetKind::Rust],
            ..Default::default()
        };
        let out = run(text, Format::Dbc, &options);

        assert!(out.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::Violation(v) if v.kind() == ViolationKind::DlcTooLarge
        )));
        let huge = out.plans[0].as_ref().unwrap();
        let (frame, clamped) = huge.encode_frame(&[("Tail", 4660.0)]);
        assert!(clamped.is_empty());
        assert_eq!(frame.len(), 9000);
        assert_eq!(huge.decode_frame(&frame)[0].1, 4660.0);
        assert_eq!(out.source("rust").unwrap().messages, vec!["Huge"]);
    }

    #[cfg(feature = "dbc")]
    #[test]
    fn test_colliding_message_names_render_once_each() {
        let text = "BU_: ECU
BO_ 16 ENG_DATA: 8 ECU
 SG_ Rpm : 0|16@1+ (1,0) [0|65535] \"\" Vector__XXX
BO_ 17 EngData: 8 ECU
 SG_ Rpm : 0|16@1+ (1,0) [0|65535] \"\" Vector__XXX
";
        for parallel in [false, true] {
            let options = PipelineOptions {
                parallel,
                ..Default::default()
            };
            let out = run(text, Format::Dbc, &options);
            let rust = &out.source("rust").unwrap().text;
            assert!(rust.contains("pub struct EngData {"));
            assert!(rust.contains("pub struct EngData2 {"));
            let c = &out.source("c").unwrap().text;
            assert!(c.contains("#define ENG_DATA_ID 0x10u"));
            assert!(c.contains("#define ENG_DATA_2_ID 0x11u"));
        }
    }

    #[test]
    fn test_unparsable_input_has_no_network() {
        #[cfg(feature = "ldf")]
        {
            let out = run("Nodes { }", Format::Ldf, &PipelineOptions::default());
            assert!(out.network.is_none());
            assert!(out.diagnostics.has_errors());
            assert!(out.sources.is_empty());
        }
    }

    #[test]
    fn test_format_from_extension() {
        #[cfg(feature = "dbc")]
        assert_eq!(Format::from_extension("DBC"), Some(Format::Dbc));
        #[cfg(feature = "ncf")]
        assert_eq!(Format::from_extension("ncf"), Some(Format::Ncf));
        assert_eq!(Format::from_extension("arxml"), None);
    }
}
