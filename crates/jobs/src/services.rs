use std::sync::Arc;

use recipe_bot_ci::CiApi;
use recipe_bot_core::config::BotIdentity;
use recipe_bot_github::HostApi;
use recipe_bot_repo::{CheckoutContext, GitBackend, Linter};
use recipe_bot_upload::{RetryPolicy, Uploader};

/// Collaborators a task talks to, bound to one home repository.
#[derive(Clone)]
pub struct Services<'a> {
    pub host: &'a dyn HostApi,
    pub ci: &'a dyn CiApi,
    pub git: Arc<dyn GitBackend>,
    pub uploader: &'a dyn Uploader,
    pub linter: &'a dyn Linter,
    /// Token embedded in clone and push URLs.
    pub token: &'a str,
    pub identity: &'a BotIdentity,
    pub upload_policy: RetryPolicy,
    /// Registry namespace images are pushed under.
    pub image_namespace: &'a str,
}

impl<'a> Services<'a> {
    pub fn checkout_context(&self) -> CheckoutContext<'a> {
        CheckoutContext {
            host: self.host,
            git: self.git.clone(),
            token: self.token,
            identity: self.identity,
        }
    }
}
