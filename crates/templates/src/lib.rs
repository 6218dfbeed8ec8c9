//! Cartographer templating: `$(...)$` interpolation, ytt rendering, stamping of owned objects,
//! parameter precedence and output extraction.

#![forbid(unsafe_code)]

pub mod inputs;
pub mod interpolate;
pub mod model;
pub mod outputs;
pub mod params;
pub mod stamper;
pub mod ytt;

pub use inputs::{input_names, templating_context, Inputs, OutputsByResource};
pub use interpolate::{interpolate, InterpolateError};
pub use model::{OutputError, RunTemplate, Template, TemplateModelError};
pub use outputs::{digest, preview, Output, SourceOutput, PREVIEW_CHARACTER_LIMIT};
pub use params::merge_params;
pub use stamper::{owner_reference, StampError, Stamper, TemplateBody};
pub use ytt::{Ytt, YttError};
