//! Configuration mini-language and job definitions
//!
//! Every adapter and manager is configured with one string of
//! `key=value|key=value` pairs. The `mapping` key nests a second grammar,
//! `column:field~column:field`.

mod job;
mod mapping;
mod parameters;

pub use job::{
    ENV_INPUT, ENV_INPUT_PARAMETERS, ENV_MANAGER, ENV_MANAGER_PARAMETERS, ENV_OUTPUT,
    ENV_OUTPUT_PARAMETERS, PluginSelection, TransferJob,
};
pub use mapping::{FieldMapping, MappingEntry, parse_mapping};
pub use parameters::{MAPPING_KEY, ParameterSet, parse_parameters};
