//! Scaleway Instances API implementation of [`CloudApi`].
//!
//! Image lookup and power actions go through `scaleway-rs`. Server reads,
//! address lookups, creation, and flexible-IP management use direct HTTP
//! calls because the SDK does not expose the fields the lifecycle needs
//! (`state_detail`, routed IP settings, flexible IP ownership).

mod api;
mod error;

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::StatusCode;
use scaleway_rs::{ScalewayApi, ScalewayImage, ScalewayListInstanceImagesBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cloud::{CloudApi, CloudFuture, CreateRequest, FloatingIp, Instance};
use crate::config::ScalewayConfig;
use api::{CreateServerRequest, IpList, ServerEnvelope, ServerList, ServerRecord};

pub use error::ScalewayCloudError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";
const PAGE_SIZE: usize = 50;

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Cloud adapter that manages instances in one Scaleway zone.
#[derive(Clone)]
pub struct ScalewayCloud {
    api: ScalewayApi,
    config: ScalewayConfig,
}

impl ScalewayCloud {
    /// Constructs a new adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayCloudError::Config`] when the provided configuration
    /// fails validation.
    pub fn new(config: ScalewayConfig) -> Result<Self, ScalewayCloudError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
        })
    }

    fn zone(&self) -> &str {
        &self.config.default_zone
    }

    fn url(&self, path: &str) -> String {
        format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{}/{path}", self.zone())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, ScalewayCloudError> {
        let response = HTTP_CLIENT
            .get(url)
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ScalewayCloudError::Http {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }

    async fn resolve_image_id(&self) -> Result<String, ScalewayCloudError> {
        let config = &self.config;
        let mut images = ScalewayListInstanceImagesBuilder::new(self.api.clone(), self.zone())
            .public(true)
            .project(&config.default_project_id)
            .name(&config.default_image)
            .arch(&config.default_architecture)
            .run_async()
            .await?;
        if images.is_empty() {
            images = ScalewayListInstanceImagesBuilder::new(self.api.clone(), self.zone())
                .public(true)
                .name(&config.default_image)
                .arch(&config.default_architecture)
                .run_async()
                .await?;
        }
        self.select_image_id(images)
    }

    fn select_image_id(&self, images: Vec<ScalewayImage>) -> Result<String, ScalewayCloudError> {
        images
            .into_iter()
            .filter(|image| image.arch == self.config.default_architecture)
            .filter(|image| image.state == "available")
            .max_by(|lhs, rhs| lhs.creation_date.cmp(&rhs.creation_date))
            .map(|image| image.id)
            .ok_or_else(|| ScalewayCloudError::ImageNotFound {
                label: self.config.default_image.clone(),
                arch: self.config.default_architecture.clone(),
                zone: self.config.default_zone.clone(),
            })
    }

    async fn create_server(
        &self,
        request: &CreateRequest,
        image_id: &str,
    ) -> Result<ServerRecord, ScalewayCloudError> {
        let payload = CreateServerRequest {
            name: request.name.clone(),
            commercial_type: self.config.default_instance_type.clone(),
            image: image_id.to_owned(),
            project: self.config.default_project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: request.tags.clone(),
            organization: self.config.default_organization_id.clone(),
        };
        let response = HTTP_CLIENT
            .post(self.url("servers"))
            .header("X-Auth-Token", &self.config.secret_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            let parsed: ServerEnvelope = serde_json::from_slice(&body)?;
            return Ok(parsed.server);
        }

        if let Ok(api_err) = serde_json::from_slice::<scaleway_rs::ScalewayApiError>(&body)
            && self.is_instance_type_error(&api_err)
        {
            return Err(ScalewayCloudError::InstanceTypeUnavailable {
                instance_type: self.config.default_instance_type.clone(),
                zone: self.config.default_zone.clone(),
            });
        }
        Err(ScalewayCloudError::Http {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    fn is_instance_type_error(&self, api_err: &scaleway_rs::ScalewayApiError) -> bool {
        matches!(api_err.resource.as_deref(), Some("commercial_type"))
            || api_err
                .resource_id
                .as_deref()
                .is_some_and(|id| id == self.config.default_instance_type)
    }

    async fn power_on_if_needed(&self, server: &ServerRecord) -> Result<(), ScalewayCloudError> {
        if server.state == "running" {
            return Ok(());
        }
        if server.allowed_actions.iter().any(|action| action == "poweron") {
            self.action(&server.id, "poweron").await?;
            return Ok(());
        }
        Err(ScalewayCloudError::PowerOnNotAllowed {
            instance_id: server.id.clone(),
            state: server.state.clone(),
        })
    }

    /// Powers a freshly created server on and returns its identifier either
    /// way, so the caller can still wait on it or tear it down.
    async fn boot_created(&self, server: ServerRecord) -> String {
        if let Err(err) = self.power_on_if_needed(&server).await {
            warn!(id = %server.id, error = %err, "power-on after create failed");
        }
        server.id
    }

    async fn action(&self, id: &str, action: &str) -> Result<(), ScalewayCloudError> {
        debug!(id, action, zone = self.zone(), "performing server action");
        self.api
            .perform_instance_action_async(self.zone(), id, action)
            .await?;
        Ok(())
    }

    async fn list_servers_with_ip(&self, ip: &str) -> Result<Vec<Instance>, ScalewayCloudError> {
        let mut matches = Vec::new();
        let mut page = 1_usize;
        loop {
            let url = self.url(&format!("servers?per_page={PAGE_SIZE}&page={page}"));
            let Some(list) = self.get_json::<ServerList>(&url).await? else {
                break;
            };
            let fetched = list.servers.len();
            matches.extend(
                list.servers
                    .into_iter()
                    .filter(|server| server.owns_address(ip))
                    .map(ServerRecord::into_instance),
            );
            if fetched < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(matches)
    }

    async fn attached_floating_ip(
        &self,
        id: &str,
    ) -> Result<Option<FloatingIp>, ScalewayCloudError> {
        let url = self.url(&format!("ips?server={id}&per_page={PAGE_SIZE}"));
        let Some(list) = self.get_json::<IpList>(&url).await? else {
            return Ok(None);
        };
        Ok(list
            .ips
            .into_iter()
            .find(|ip| ip.attached_to(id))
            .map(api::FlexibleIpRecord::into_floating))
    }

    async fn delete_ip(&self, ip: &FloatingIp) -> Result<(), ScalewayCloudError> {
        let response = HTTP_CLIENT
            .delete(self.url(&format!("ips/{}", ip.id)))
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(ScalewayCloudError::Http {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }
}

impl CloudApi for ScalewayCloud {
    fn create_instance<'a>(&'a self, request: &'a CreateRequest) -> CloudFuture<'a, String> {
        Box::pin(async move {
            let created = async {
                let image_id = self.resolve_image_id().await?;
                let server = self.create_server(request, &image_id).await?;
                Ok::<_, ScalewayCloudError>(self.boot_created(server).await)
            };
            created.await.map_err(|err| err.into_cloud("create"))
        })
    }

    fn describe<'a>(&'a self, id: &'a str) -> CloudFuture<'a, Option<Instance>> {
        Box::pin(async move {
            let envelope = self
                .get_json::<ServerEnvelope>(&self.url(&format!("servers/{id}")))
                .await
                .map_err(|err| err.into_cloud("describe"))?;
            Ok(envelope.map(|found| found.server.into_instance()))
        })
    }

    fn find_by_ip<'a>(&'a self, ip: &'a str) -> CloudFuture<'a, Vec<Instance>> {
        Box::pin(async move {
            self.list_servers_with_ip(ip)
                .await
                .map_err(|err| err.into_cloud("find by address"))
        })
    }

    fn start<'a>(&'a self, id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            self.action(id, "poweron")
                .await
                .map_err(|err| err.into_cloud("start"))
        })
    }

    fn stop<'a>(&'a self, id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            self.action(id, "poweroff")
                .await
                .map_err(|err| err.into_cloud("stop"))
        })
    }

    fn terminate<'a>(&'a self, id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            self.action(id, "terminate")
                .await
                .map_err(|err| err.into_cloud("terminate"))
        })
    }

    fn floating_ip<'a>(&'a self, id: &'a str) -> CloudFuture<'a, Option<FloatingIp>> {
        Box::pin(async move {
            self.attached_floating_ip(id)
                .await
                .map_err(|err| err.into_cloud("floating ip lookup"))
        })
    }

    fn release_ip<'a>(&'a self, ip: &'a FloatingIp) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            self.delete_ip(ip)
                .await
                .map_err(|err| err.into_cloud("release ip"))
        })
    }
}
