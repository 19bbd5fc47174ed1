// ABOUTME: FormPilot configuration library
// ABOUTME: Environment variable names, defaults and validated assistant settings

pub mod constants;
pub mod settings;
pub mod validation;

pub use settings::AssistantSettings;
pub use validation::{Result, ValidationError};
