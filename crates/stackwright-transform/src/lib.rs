//! CloudFormation templates from Stackwright resource descriptors
//!
//! The transformer walks the same descriptors a deployment uses and emits a
//! single `cloudformation_template.json` (or `.yaml`) with cross references
//! expressed through deterministic logical ids.
//!
//! # Example
//!
//! ```ignore
//! use stackwright_transform::{OutputFormat, TransformSettings, Transformer};
//!
//! let transformer = Transformer::new(TransformSettings::new("eu-west-1", "123456789012"));
//! let template = transformer.transform(&descriptors).await?;
//! transformer.write(&template, "bundles/b1", OutputFormat::Json).await?;
//! ```

pub mod converter;
pub mod error;
pub mod logic_name;
pub mod template;
pub mod transformer;

pub use converter::{ConvertContext, ConverterTable, ResourceConverter, TransformSettings};
pub use error::{Result, TransformError};
pub use logic_name::{logic_name, to_logic_name};
pub use template::{OutputFormat, Template, TemplateResource};
pub use transformer::Transformer;
