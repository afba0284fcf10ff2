pub mod executor;
pub mod registry;
pub mod reporter;
pub mod sequence;
pub mod suite;
pub mod types;

pub use executor::{CallEnv, CallExecutor, ExecutorSettings};
pub use registry::{SuiteId, SuiteRegistry};
pub use reporter::TestReporter;
pub use sequence::{SequenceRunner, SuiteRunner};
pub use suite::{Authenticator, HeaderAuthenticator, SuiteInstance};
pub use types::{Attempt, CallReport, CallState, SequenceReport, SuiteReport, TestSummary};
