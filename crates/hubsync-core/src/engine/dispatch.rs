// ── Local write dispatch ──
//
// Routes a write the host made to a tree node back to the hub. The node's
// `native.link` names the owning capability (or device); `common.write`
// decides between forwarding the value and refreshing the device.

use hubsync_api::{HubClient, Link, Resolved};
use serde_json::Value;
use tracing::{info, warn};

use super::Engine;
use crate::error::CoreError;
use crate::store::ObjectStore;

/// What a local write turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Acknowledged write; the engine authored it.
    Ignored,
    /// Value sent to the hub capability.
    Forwarded { capability: String, state: String },
    /// Target is read-only; the owning device was re-synced instead.
    Refreshed { device: String },
}

impl<H, S> Engine<H, S>
where
    H: HubClient,
    S: ObjectStore,
{
    /// Handle a state write on node `id`.
    ///
    /// Rejected hub writes come back as errors and are not retried; the
    /// node keeps the unacknowledged value until the hub pushes again.
    pub async fn on_local_write(
        &mut self,
        id: &str,
        value: Value,
        ack: bool,
    ) -> Result<DispatchOutcome, CoreError> {
        if ack {
            return Ok(DispatchOutcome::Ignored);
        }

        let object = self
            .store
            .get_object(id)
            .await?
            .ok_or_else(|| CoreError::NodeNotFound { id: id.to_owned() })?;
        let link = object
            .native
            .link
            .clone()
            .ok_or_else(|| CoreError::MissingLinkage { id: id.to_owned() })?;

        match link {
            Link::Capability(capability_id) => {
                // The hub may have dropped the capability since the node was
                // written; check before following it to the device.
                let capability = self.hub.capability_by_id(&capability_id).ok_or(
                    CoreError::CapabilityNotFound {
                        identifier: capability_id,
                    },
                )?;

                if object.common.is_writable() {
                    let state = object
                        .native
                        .state
                        .clone()
                        .or_else(|| object.common.name.clone())
                        .ok_or_else(|| CoreError::MissingLinkage { id: id.to_owned() })?;

                    if let Err(e) = self
                        .hub
                        .set_capability_state(&capability, &state, value)
                        .await
                    {
                        warn!(id = %id, capability = %capability.id, error = %e, "hub rejected local write");
                        return Err(e.into());
                    }
                    info!(id = %id, capability = %capability.id, state = %state, "local write forwarded");
                    return Ok(DispatchOutcome::Forwarded {
                        capability: capability.id.clone(),
                        state,
                    });
                }

                let device = self.hub.device_by_capability(&capability).ok_or_else(|| {
                    CoreError::DeviceNotFound {
                        identifier: capability.device.to_string(),
                    }
                })?;
                self.refresh_device(&device).await;
                Ok(DispatchOutcome::Refreshed {
                    device: device.id.clone(),
                })
            }
            Link::Device(device_id) => match self.hub.resolve_link(&Link::Device(device_id.clone())) {
                Some(Resolved::Device(device)) => {
                    self.refresh_device(&device).await;
                    Ok(DispatchOutcome::Refreshed {
                        device: device.id.clone(),
                    })
                }
                _ => Err(CoreError::DeviceNotFound {
                    identifier: device_id,
                }),
            },
            Link::Location(_) => Err(CoreError::MissingLinkage { id: id.to_owned() }),
        }
    }
}
