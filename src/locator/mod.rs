//! Service locator — explicit plugin registry and capability resolution.
//!
//! Integrations register a [`PluginManifest`] with one typed factory slot
//! per capability; resolution is a map lookup, not reflection. The rules:
//!   - Missing slot + supplied fallback → fallback handler, bound normally
//!   - Missing slot + no fallback → `None` (a routing outcome, "not
//!     implemented")
//!   - Factory panic or client construction failure → logged with the
//!     offending namespace, then `None`; nothing escapes the locator
//!
//! Handlers are constructed fresh per invocation and bound to a
//! [`CapabilityContext`] built from the integration's registry record, so
//! there is no cached mutable state and no bind/call ordering.

use crate::capability::generic::{
    GenericDeleteIntegration, GenericGetConfiguration, GenericSetConfiguration, GenericStatus,
};
use crate::capability::{
    ActivateIntegration, CapabilityContext, CapabilityKind, DeleteIntegration,
    ExternalUserMapping, GetConfiguration, GetContactOwner, IntegrationFields, ListDropDown,
    ListUsers, ProcessCallEvent, ProcessOmnichannelEvent, ProcessPresenceEvent, ProcessSmsEvent,
    ProcessSmsPush, SetConfiguration, StatusProbe,
};
use crate::integration::alias::resolve_canonical_name;
use crate::integration::client::{HttpIntegrationClient, IntegrationClient};
use crate::integration::IntegrationIdentity;
use crate::registry::IntegrationRecord;
use crate::types::{Error, HttpClientConfig, Result};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

// =============================================================================
// Factory types
// =============================================================================

/// Constructs a fresh handler per invocation.
pub type HandlerFactory<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

/// Constructs the integration's API client from its identity. The identity
/// carries the display alias so a rebranded instance is distinguishable in
/// outbound traffic and logs.
pub type ClientFactory =
    Arc<dyn Fn(&IntegrationIdentity) -> Result<Arc<dyn IntegrationClient>> + Send + Sync>;

/// A resolved handler together with the context it is bound to.
pub struct CapabilityBinding<T: ?Sized> {
    pub handler: Arc<T>,
    pub ctx: CapabilityContext,
}

impl<T: ?Sized> fmt::Debug for CapabilityBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityBinding")
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Panic payload → printable message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic (no message)".to_string()
    }
}

// =============================================================================
// Manifest and catalog (one slot / builder / resolver per capability)
// =============================================================================

macro_rules! capability_slots {
    ($(($slot:ident, $with:ident, $resolve:ident, $trait_:ident, $kind:ident)),+ $(,)?) => {
        /// Everything one integration registers: its canonical name, its
        /// client constructor, and a typed factory per capability it
        /// provides. Slots are statically typed, so a manifest that builds
        /// is a manifest whose handlers satisfy their contracts.
        pub struct PluginManifest {
            canonical_name: String,
            client_factory: ClientFactory,
            $( $slot: Option<HandlerFactory<dyn $trait_>>, )+
        }

        impl PluginManifest {
            /// New manifest with no capabilities. The raw name is
            /// alias-resolved.
            pub fn new(raw_name: &str, client_factory: ClientFactory) -> Self {
                Self {
                    canonical_name: resolve_canonical_name(raw_name),
                    client_factory,
                    $( $slot: None, )+
                }
            }

            pub fn canonical_name(&self) -> &str {
                &self.canonical_name
            }

            /// Capabilities this manifest provides natively (fallbacks not
            /// counted).
            pub fn capabilities(&self) -> Vec<CapabilityKind> {
                let mut kinds = Vec::new();
                $( if self.$slot.is_some() { kinds.push(CapabilityKind::$kind); } )+
                kinds
            }

            $(
                pub fn $with(mut self, factory: HandlerFactory<dyn $trait_>) -> Self {
                    self.$slot = Some(factory);
                    self
                }
            )+
        }

        impl PluginCatalog {
            $(
                pub fn $resolve(
                    &self,
                    record: &IntegrationRecord,
                    fallback: Option<&HandlerFactory<dyn $trait_>>,
                ) -> Option<CapabilityBinding<dyn $trait_>> {
                    self.resolve_slot(record, CapabilityKind::$kind, |m| m.$slot.as_ref(), fallback)
                }
            )+
        }
    };
}

capability_slots!(
    (activate, with_activate, resolve_activate, ActivateIntegration, ActivateIntegration),
    (get_configuration, with_get_configuration, resolve_get_configuration, GetConfiguration, GetConfiguration),
    (set_configuration, with_set_configuration, resolve_set_configuration, SetConfiguration, SetConfiguration),
    (process_call, with_process_call, resolve_process_call, ProcessCallEvent, ProcessCallEvent),
    (process_sms, with_process_sms, resolve_process_sms, ProcessSmsEvent, ProcessSmsEvent),
    (process_presence, with_process_presence, resolve_process_presence, ProcessPresenceEvent, ProcessPresenceEvent),
    (process_omnichannel, with_process_omnichannel, resolve_process_omnichannel, ProcessOmnichannelEvent, ProcessOmnichannelEvent),
    (status, with_status, resolve_status, StatusProbe, Status),
    (delete, with_delete, resolve_delete, DeleteIntegration, DeleteIntegration),
    (list_users, with_list_users, resolve_list_users, ListUsers, ListUsers),
    (contact_owner, with_contact_owner, resolve_contact_owner, GetContactOwner, GetContactOwner),
    (user_mapping, with_user_mapping, resolve_user_mapping, ExternalUserMapping, ExternalUserMapping),
    (integration_fields, with_integration_fields, resolve_integration_fields, IntegrationFields, IntegrationFields),
    (list_drop_down, with_list_drop_down, resolve_list_drop_down, ListDropDown, ListDropDown),
    (sms_push, with_sms_push, resolve_sms_push, ProcessSmsPush, ProcessSmsPush),
);

impl fmt::Debug for PluginManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManifest")
            .field("canonical_name", &self.canonical_name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// The explicit plugin registry.
pub struct PluginCatalog {
    manifests: HashMap<String, PluginManifest>,
    /// Client constructor for integrations resolved purely through
    /// fallbacks (no manifest registered).
    default_client_factory: ClientFactory,
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("integrations", &self.list_names())
            .finish()
    }
}

impl PluginCatalog {
    pub fn new(default_client_factory: ClientFactory) -> Self {
        Self {
            manifests: HashMap::new(),
            default_client_factory,
        }
    }

    /// Catalog whose clients are [`HttpIntegrationClient`]s built from the
    /// given HTTP configuration. The standard production setup.
    pub fn with_http_clients(http: HttpClientConfig) -> Self {
        let http = Arc::new(http);
        Self::new(Arc::new(move |identity| {
            HttpIntegrationClient::new(identity, &http)
                .map(|client| Arc::new(client) as Arc<dyn IntegrationClient>)
        }))
    }

    /// Register a manifest. Re-registering a name replaces the previous
    /// manifest.
    pub fn register(&mut self, manifest: PluginManifest) -> Result<()> {
        if manifest.canonical_name.is_empty() {
            return Err(Error::validation("integration name cannot be empty"));
        }
        if self
            .manifests
            .insert(manifest.canonical_name.clone(), manifest)
            .is_some()
        {
            tracing::debug!(
                code = "manifest_replaced",
                "integration manifest re-registered"
            );
        }
        Ok(())
    }

    pub fn get(&self, raw_name: &str) -> Option<&PluginManifest> {
        self.manifests.get(&resolve_canonical_name(raw_name))
    }

    pub fn has_integration(&self, raw_name: &str) -> bool {
        self.manifests
            .contains_key(&resolve_canonical_name(raw_name))
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.manifests.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Shared resolution path behind the typed `resolve_*` methods.
    fn resolve_slot<T: ?Sized>(
        &self,
        record: &IntegrationRecord,
        capability: CapabilityKind,
        slot: impl Fn(&PluginManifest) -> Option<&HandlerFactory<T>>,
        fallback: Option<&HandlerFactory<T>>,
    ) -> Option<CapabilityBinding<T>> {
        let manifest = self.manifests.get(&record.canonical_name);
        let factory = match manifest.and_then(&slot).or(fallback) {
            Some(factory) => factory,
            None => {
                tracing::debug!(
                    code = "capability_missing",
                    integration = %record.canonical_name,
                    capability = %capability,
                    "no handler registered and no fallback"
                );
                return None;
            }
        };

        let identity = record.identity();
        let namespace = identity.namespace();

        let handler = match catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(handler) => handler,
            Err(payload) => {
                tracing::error!(
                    code = "resolution_failure",
                    integration = %namespace,
                    capability = %capability,
                    panic = %panic_message(payload.as_ref()),
                    "handler factory panicked"
                );
                return None;
            }
        };

        let client_factory = manifest
            .map(|m| &m.client_factory)
            .unwrap_or(&self.default_client_factory);
        let client = match catch_unwind(AssertUnwindSafe(|| client_factory(&identity))) {
            Ok(Ok(client)) => client,
            Ok(Err(err)) => {
                tracing::error!(
                    code = "resolution_failure",
                    integration = %namespace,
                    capability = %capability,
                    error = %err,
                    "client construction failed"
                );
                return None;
            }
            Err(payload) => {
                tracing::error!(
                    code = "resolution_failure",
                    integration = %namespace,
                    capability = %capability,
                    panic = %panic_message(payload.as_ref()),
                    "client factory panicked"
                );
                return None;
            }
        };

        Some(CapabilityBinding {
            handler,
            ctx: CapabilityContext::new(identity, record.config.clone(), client),
        })
    }
}

// =============================================================================
// Generic fallback factories
// =============================================================================

pub fn generic_status() -> HandlerFactory<dyn StatusProbe> {
    Arc::new(|| Arc::new(GenericStatus))
}

pub fn generic_get_configuration() -> HandlerFactory<dyn GetConfiguration> {
    Arc::new(|| Arc::new(GenericGetConfiguration))
}

pub fn generic_set_configuration() -> HandlerFactory<dyn SetConfiguration> {
    Arc::new(|| Arc::new(GenericSetConfiguration))
}

pub fn generic_delete() -> HandlerFactory<dyn DeleteIntegration> {
    Arc::new(|| Arc::new(GenericDeleteIntegration))
}
