//! Tool-configuration tooling for the toolgate provisioner.
//!
//! A "tool-configuration document" is the compiled artifact describing the
//! callable operations of one tool API: `server.config` plus a list of tools
//! with request templates. This crate owns the document model, the external
//! converter that compiles an OpenAPI document into one ([`Converter`]), and
//! the idempotent gateway rewrite applied afterwards ([`patcher::patch`]).

pub mod compiler;
pub mod document;
pub mod error;
pub mod patcher;

pub use compiler::Converter;
pub use document::{HeaderEntry, RequestTemplate, ServerSection, ToolConfigDocument, ToolEntry};
pub use error::{Result, ToolConfigError};
pub use patcher::{BASE_URL_TEMPLATE, BEARER_TEMPLATE, PatchOptions, patch};
