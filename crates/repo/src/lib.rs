pub mod checkout;
pub mod git;
pub mod lint;
pub mod recipe;

pub use checkout::{Checkout, CheckoutContext, CheckoutTarget, Workspace, acquire};
pub use git::{GitBackend, GitCli};
pub use lint::{CommandLinter, LintReport, Linter};
