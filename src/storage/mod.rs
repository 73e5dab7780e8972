pub mod template_store;

pub use template_store::{TemplateRecord, TemplateSource, TemplateStore};
