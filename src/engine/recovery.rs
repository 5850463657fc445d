use crate::api::ClusterApi;
use crate::engine::error::EngineError;
use crate::engine::task::RecoverAction;
use crate::shared::ids::DeploymentName;
use serde_json::{Map, Value};

/// Fields the server never echoes back. For these, and only these, the
/// client's last-known values are authoritative: the canonical configuration
/// re-fetched after a repair has them blanked and must be overlaid before
/// re-submission.
pub const SECRET_FIELDS: &[&str] = &[
    "password",
    "root_password",
    "proxysys_password",
    "obproxy_sys_password",
    "admin_passwd",
];

fn is_secret_field(key: &str) -> bool {
    SECRET_FIELDS.contains(&key)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn overlay_secrets(server: &mut Map<String, Value>, local: &Map<String, Value>) {
    for (key, local_value) in local {
        match server.get_mut(key) {
            Some(server_value) => {
                if is_secret_field(key) {
                    if is_blank(server_value) && !is_blank(local_value) {
                        *server_value = local_value.clone();
                    }
                } else {
                    match (server_value, local_value) {
                        (Value::Object(server_map), Value::Object(local_map)) => {
                            overlay_secrets(server_map, local_map);
                        }
                        (Value::Array(server_items), Value::Array(local_items)) => {
                            for (server_item, local_item) in
                                server_items.iter_mut().zip(local_items)
                            {
                                if let (Value::Object(server_map), Value::Object(local_map)) =
                                    (server_item, local_item)
                                {
                                    overlay_secrets(server_map, local_map);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            None => {
                if is_secret_field(key) && !is_blank(local_value) {
                    server.insert(key.clone(), local_value.clone());
                }
            }
        }
    }
}

/// Merges a re-fetched configuration with locally retained secrets. The
/// server copy wins everywhere except secret fields it left absent or blank.
pub fn merge_retained_secrets(mut server: Value, local: &Value) -> Value {
    if let (Value::Object(server_map), Value::Object(local_map)) = (&mut server, local) {
        overlay_secrets(server_map, local_map);
    }
    server
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub actions: Vec<RecoverAction>,
    pub config: Value,
}

/// Runs the single-shot auto-repair sequence: trigger the remote repair,
/// re-fetch the canonical configuration, overlay retained secrets, and
/// re-submit the merged configuration as a fresh deployment config. Any
/// failure surfaces as fatal; repair is never retried automatically.
pub fn auto_repair(
    api: &dyn ClusterApi,
    name: &DeploymentName,
    local_config: &Value,
) -> Result<RepairOutcome, EngineError> {
    let actions = api.recover(name)?;
    let canonical = api.deployment_config(name)?;
    let merged = merge_retained_secrets(canonical, local_config);
    api.create_deployment_config(name, &merged)?;
    Ok(RepairOutcome {
        actions,
        config: merged,
    })
}
