pub mod extract;
pub mod init;
pub mod resolver;
pub mod store;
pub mod types;

pub use extract::{ExtractError, extract_json_path, extract_xpath};
pub use init::{PendingVariables, extract_variables, initialize_constants};
pub use resolver::{FieldContext, FieldResolver, VariableResolver};
pub use store::{ScopedLookup, SharedVariables, VariableLookup};
pub use types::VariableContext;
