//! TeamCity REST adapter for [`CiStatusClient`].

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use traffic_light_core::model::{Auth, BuildStatus, BuildSummary, CheckStateResult, Settings};
use traffic_light_core::TransportError;

use crate::ci_client::CiStatusClient;

/// How many recent builds to inspect per build type. Enough to find the
/// latest finished build behind a couple of running ones.
const RECENT_BUILDS: usize = 5;

/// Client bound to one server, one set of credentials and one branch.
pub struct TeamcityClient {
    http: reqwest::Client,
    server_url: String,
    auth: Auth,
    branch: String,
}

impl TeamcityClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_url: settings.server_url.trim_end_matches('/').to_string(),
            auth: settings.auth.clone(),
            branch: settings.branch.clone(),
        }
    }

    fn url(&self, path: &str, locator: &str, fields: Option<&str>) -> Result<Url, TransportError> {
        let raw = format!("{}{}", self.server_url, path);
        let mut url = Url::parse(&raw).map_err(|e| TransportError::Request {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("locator", locator);
            if let Some(fields) = fields {
                query.append_pair("fields", fields);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TransportError> {
        let url_str = url.to_string();
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TransportError::Request {
                url: url_str.clone(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(TransportError::Status {
                url: url_str,
                status: resp.status().as_u16(),
            });
        }

        resp.json::<T>().await.map_err(|e| TransportError::Decode {
            url: url_str,
            message: e.to_string(),
        })
    }

    fn builds_locator(&self, build_type: &str) -> String {
        let mut locator = format!("buildType:(id:{build_type})");
        if !self.branch.is_empty() {
            locator.push_str(&format!(",branch:(name:{})", self.branch));
        }
        locator.push_str(&format!(",running:any,canceled:false,count:{RECENT_BUILDS}"));
        locator
    }

    /// Summary for a failing build type, `None` when it is green or has no
    /// finished builds yet.
    async fn summarize(&self, build_type: &str) -> Result<Option<BuildSummary>, TransportError> {
        let url = self.url(
            "/app/rest/builds",
            &self.builds_locator(build_type),
            Some("build(id,state,status,buildType(id,name))"),
        )?;
        let builds: Builds = self.get_json(url).await?;

        let running = builds.build.iter().any(|b| b.state == "running");
        let Some(last_finished) = builds.build.iter().find(|b| b.state == "finished") else {
            return Ok(None);
        };
        if last_finished.status.as_deref() == Some("SUCCESS") {
            return Ok(None);
        }

        let display_name = last_finished
            .build_type
            .as_ref()
            .and_then(|bt| bt.name.clone())
            .unwrap_or_else(|| build_type.to_string());

        Ok(Some(BuildSummary {
            id: build_type.to_string(),
            display_name,
            investigators: self.investigators(build_type).await?,
            running,
        }))
    }

    async fn investigators(&self, build_type: &str) -> Result<Vec<String>, TransportError> {
        let url = self.url(
            "/app/rest/investigations",
            &format!("buildType:(id:{build_type})"),
            None,
        )?;
        let found: Investigations = self.get_json(url).await?;

        let mut users: Vec<String> = Vec::new();
        for inv in found.investigation {
            if inv.state.as_deref() == Some("FIXED") || inv.state.as_deref() == Some("GIVEN_UP") {
                continue;
            }
            if let Some(user) = inv.assignee.and_then(|a| a.username) {
                if !users.contains(&user) {
                    users.push(user);
                }
            }
        }
        Ok(users)
    }
}

#[async_trait]
impl CiStatusClient for TeamcityClient {
    async fn check_state(&self, build_type_ids: &[String]) -> Result<CheckStateResult, TransportError> {
        let mut items = Vec::new();
        for build_type in build_type_ids {
            if let Some(summary) = self.summarize(build_type).await? {
                items.push(summary);
            }
        }
        Ok(aggregate(items))
    }
}

/// Any failing build type turns the light red.
pub fn aggregate(failing: Vec<BuildSummary>) -> CheckStateResult {
    let status = if failing.is_empty() {
        BuildStatus::Success
    } else {
        BuildStatus::Fail
    };
    CheckStateResult {
        items: failing,
        status,
    }
}

#[derive(Debug, Deserialize)]
struct Builds {
    #[serde(default)]
    build: Vec<Build>,
}

#[derive(Debug, Deserialize)]
struct Build {
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "buildType")]
    build_type: Option<BuildTypeRef>,
}

#[derive(Debug, Deserialize)]
struct BuildTypeRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Investigations {
    #[serde(default)]
    investigation: Vec<Investigation>,
}

#[derive(Debug, Deserialize)]
struct Investigation {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    assignee: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    username: Option<String>,
}
