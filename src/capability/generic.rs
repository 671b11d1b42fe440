//! Shared default handlers.
//!
//! Most integrations only implement the capabilities that differ for them;
//! the engine fills the rest with these fallbacks at resolution time. A
//! generic handler never talks to the remote API.

use super::{
    CapabilityContext, DeleteIntegration, GetConfiguration, SetConfiguration, StatusProbe,
};
use crate::integration::configuration::{ConfigDocument, PRESERVED_KEYS};
use crate::types::{AgentId, Result};
use async_trait::async_trait;

/// Default liveness probe: a configured integration counts as alive.
#[derive(Debug, Default)]
pub struct GenericStatus;

#[async_trait]
impl StatusProbe for GenericStatus {
    async fn is_alive(&self, _ctx: &CapabilityContext) -> Result<bool> {
        Ok(true)
    }
}

/// Default configuration read: the stored document as-is.
#[derive(Debug, Default)]
pub struct GenericGetConfiguration;

#[async_trait]
impl GetConfiguration for GenericGetConfiguration {
    async fn get_configuration(&self, ctx: &CapabilityContext) -> Result<ConfigDocument> {
        Ok(ctx.config.clone())
    }
}

/// Default configuration update: boolean normalization plus credential
/// carry-over from the stored document.
#[derive(Debug, Default)]
pub struct GenericSetConfiguration;

#[async_trait]
impl SetConfiguration for GenericSetConfiguration {
    async fn set_configuration(
        &self,
        ctx: &CapabilityContext,
        mut incoming: ConfigDocument,
        _updated_by: Option<&AgentId>,
    ) -> Result<ConfigDocument> {
        incoming.normalize_bool_strings();
        incoming.merge_missing_from(&ctx.config, PRESERVED_KEYS);
        Ok(incoming)
    }
}

/// Default removal: nothing to clean up remotely.
#[derive(Debug, Default)]
pub struct GenericDeleteIntegration;

#[async_trait]
impl DeleteIntegration for GenericDeleteIntegration {
    async fn delete(&self, _ctx: &CapabilityContext, _auth_header: Option<&str>) -> Result<bool> {
        Ok(true)
    }
}
