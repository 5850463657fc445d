use crate::api::error::{from_ureq, ApiError, Envelope};
use crate::engine::task::{RecoverAction, TaskSnapshot};
use crate::shared::ids::DeploymentName;
use serde::Deserialize;
use serde_json::Value;

/// The remote workflow surface the engine drives. Implemented over HTTP for
/// production and by scripted fakes in tests.
pub trait ClusterApi {
    fn precheck_start(&self, name: &DeploymentName) -> Result<(), ApiError>;
    fn precheck_status(&self, name: &DeploymentName) -> Result<TaskSnapshot, ApiError>;
    fn recover(&self, name: &DeploymentName) -> Result<Vec<RecoverAction>, ApiError>;
    fn deployment_config(&self, name: &DeploymentName) -> Result<Value, ApiError>;
    fn create_deployment_config(
        &self,
        name: &DeploymentName,
        config: &Value,
    ) -> Result<(), ApiError>;
    fn install_start(&self, name: &DeploymentName) -> Result<(), ApiError>;
    fn install_status(&self, name: &DeploymentName) -> Result<TaskSnapshot, ApiError>;
}

#[derive(Debug, Clone, Deserialize)]
struct RecoverData {
    #[serde(default)]
    items: Vec<RecoverAction>,
}

#[derive(Debug, Clone, Deserialize)]
struct DeploymentData {
    config: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct EmptyData {}

#[derive(Debug, Clone)]
pub struct HttpClusterApi {
    api_base: String,
}

impl HttpClusterApi {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }

    fn endpoint(&self, name: &DeploymentName, suffix: &str) -> String {
        let base = self.api_base.trim_end_matches('/');
        let encoded = urlencoding::encode(name.as_str());
        if suffix.is_empty() {
            format!("{base}/deployments/{encoded}")
        } else {
            format!("{base}/deployments/{encoded}/{suffix}")
        }
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<Envelope<T>, ApiError> {
        let response = ureq::get(url).call().map_err(from_ureq)?;
        response.into_json::<Envelope<T>>().map_err(|e| {
            ApiError::Decode {
                detail: e.to_string(),
            }
        })
    }

    fn post<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Envelope<T>, ApiError> {
        let request = ureq::post(url);
        let response = match body {
            Some(value) => request.send_json(value.clone()),
            None => request.call(),
        }
        .map_err(from_ureq)?;
        response.into_json::<Envelope<T>>().map_err(|e| {
            ApiError::Decode {
                detail: e.to_string(),
            }
        })
    }
}

impl ClusterApi for HttpClusterApi {
    fn precheck_start(&self, name: &DeploymentName) -> Result<(), ApiError> {
        self.post::<EmptyData>(&self.endpoint(name, "precheck"), None)?
            .into_ack("precheck start")
    }

    fn precheck_status(&self, name: &DeploymentName) -> Result<TaskSnapshot, ApiError> {
        self.get::<TaskSnapshot>(&self.endpoint(name, "precheck"))?
            .into_data("precheck status")
    }

    fn recover(&self, name: &DeploymentName) -> Result<Vec<RecoverAction>, ApiError> {
        let data = self
            .post::<RecoverData>(&self.endpoint(name, "recover"), None)?
            .into_data("recover")?;
        Ok(data.items)
    }

    fn deployment_config(&self, name: &DeploymentName) -> Result<Value, ApiError> {
        let data = self
            .get::<DeploymentData>(&self.endpoint(name, ""))?
            .into_data("deployment config")?;
        Ok(data.config)
    }

    fn create_deployment_config(
        &self,
        name: &DeploymentName,
        config: &Value,
    ) -> Result<(), ApiError> {
        self.post::<EmptyData>(&self.endpoint(name, "config"), Some(config))?
            .into_ack("deployment config create")
    }

    fn install_start(&self, name: &DeploymentName) -> Result<(), ApiError> {
        self.post::<EmptyData>(&self.endpoint(name, "install"), None)?
            .into_ack("install start")
    }

    fn install_status(&self, name: &DeploymentName) -> Result<TaskSnapshot, ApiError> {
        self.get::<TaskSnapshot>(&self.endpoint(name, "install"))?
            .into_data("install status")
    }
}
