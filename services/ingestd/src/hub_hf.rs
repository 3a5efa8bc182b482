use std::collections::BTreeMap;

use async_trait::async_trait;
use datasets::validate::flatten;
use datasets::RemoteDatasetInfo;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::HubConfig;
use crate::hub::{HubClient, HubError, RowsPage};

/// Hugging Face Hub for search, datasets-server for info and rows.
pub struct HfHubClient {
    cfg: HubConfig,
    client: reqwest::Client,
}

impl HfHubClient {
    pub fn new(cfg: HubConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self { cfg, client })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T, HubError> {
        let mut req = self.client.get(&url).query(query);
        if let Some(token) = &self.cfg.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| HubError::Unavailable(e.to_string()))?;
        match resp.status() {
            StatusCode::NOT_FOUND => return Err(HubError::NotFound(what.to_string())),
            s if !s.is_success() => {
                return Err(HubError::Unavailable(format!("{what}: HTTP {s}")));
            }
            _ => {}
        }
        debug!(url = %url, "hub request ok");

        resp.json()
            .await
            .map_err(|e| HubError::Unavailable(format!("{what}: {e}")))
    }
}

#[derive(Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    downloads: Option<u64>,
    #[serde(default)]
    likes: Option<u64>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct InfoResponse {
    #[serde(default)]
    dataset_info: BTreeMap<String, ConfigInfo>,
}

#[derive(Deserialize)]
struct ConfigInfo {
    #[serde(default)]
    description: String,
    #[serde(default)]
    features: Map<String, Value>,
    #[serde(default)]
    splits: BTreeMap<String, SplitInfo>,
    #[serde(default)]
    dataset_size: Option<u64>,
}

#[derive(Deserialize)]
struct SplitInfo {
    #[serde(default)]
    num_examples: u64,
}

#[derive(Deserialize)]
struct RowsResponse {
    #[serde(default)]
    rows: Vec<RowEntry>,
    #[serde(default)]
    num_rows_total: u64,
}

#[derive(Deserialize)]
struct RowEntry {
    row: Map<String, Value>,
}

/// `{"dtype": "string", "_type": "Value"}` -> `string`; lists and nested types keep their `_type`.
fn feature_type(v: &Value) -> String {
    v.get("dtype")
        .or_else(|| v.get("_type"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| if v.is_array() { "list".into() } else { "unknown".into() })
}

fn into_info(name: &str, resp: InfoResponse) -> Result<RemoteDatasetInfo, HubError> {
    let mut configs = resp.dataset_info;
    let config = if configs.contains_key("default") {
        "default".to_string()
    } else {
        configs
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| HubError::NotFound(name.to_string()))?
    };
    let ci = configs
        .remove(&config)
        .ok_or_else(|| HubError::NotFound(name.to_string()))?;

    Ok(RemoteDatasetInfo {
        name: name.to_string(),
        description: ci.description,
        splits: ci.splits.keys().cloned().collect(),
        features: ci
            .features
            .iter()
            .map(|(k, v)| (k.clone(), feature_type(v)))
            .collect(),
        num_rows: ci
            .splits
            .iter()
            .map(|(k, s)| (k.clone(), s.num_examples))
            .collect(),
        config: Some(config),
        size_in_bytes: ci.dataset_size,
        ..Default::default()
    })
}

#[async_trait]
impl HubClient for HfHubClient {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<RemoteDatasetInfo>, HubError> {
        let url = format!("{}/api/datasets", self.cfg.hub_url);
        let hits: Vec<SearchHit> = self
            .get_json(
                url,
                &[("search", query.to_string()), ("limit", limit.to_string())],
                "search",
            )
            .await?;

        Ok(hits
            .into_iter()
            .map(|h| RemoteDatasetInfo {
                name: h.id,
                description: h.description.unwrap_or_default(),
                downloads: h.downloads,
                likes: h.likes,
                tags: h.tags,
                ..Default::default()
            })
            .collect())
    }

    async fn info(&self, name: &str) -> Result<RemoteDatasetInfo, HubError> {
        let url = format!("{}/info", self.cfg.rows_url);
        let resp: InfoResponse = self
            .get_json(url, &[("dataset", name.to_string())], name)
            .await?;
        into_info(name, resp)
    }

    async fn rows(
        &self,
        name: &str,
        config: Option<&str>,
        split: &str,
        offset: u64,
        length: u32,
    ) -> Result<RowsPage, HubError> {
        let url = format!("{}/rows", self.cfg.rows_url);
        let resp: RowsResponse = self
            .get_json(
                url,
                &[
                    ("dataset", name.to_string()),
                    ("config", config.unwrap_or("default").to_string()),
                    ("split", split.to_string()),
                    ("offset", offset.to_string()),
                    ("length", length.min(100).to_string()),
                ],
                name,
            )
            .await?;

        Ok(RowsPage {
            rows: resp.rows.iter().map(|r| flatten(&r.row)).collect(),
            total: resp.num_rows_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn info_prefers_default_config() {
        let resp: InfoResponse = serde_json::from_value(json!({
            "dataset_info": {
                "other": {"splits": {"train": {"num_examples": 1}}},
                "default": {
                    "description": "Instruction data",
                    "features": {
                        "instruction": {"dtype": "string", "_type": "Value"},
                        "output": {"dtype": "string", "_type": "Value"},
                        "tags": [{"dtype": "string", "_type": "Value"}]
                    },
                    "splits": {
                        "train": {"name": "train", "num_examples": 52002},
                        "test": {"name": "test", "num_examples": 100}
                    },
                    "dataset_size": 4096
                }
            }
        }))
        .unwrap();

        let info = into_info("tatsu-lab/alpaca", resp).unwrap();
        assert_eq!(info.config.as_deref(), Some("default"));
        assert_eq!(info.features["instruction"], "string");
        assert_eq!(info.features["tags"], "list");
        assert_eq!(info.num_rows["train"], 52002);
        assert!(info.splits.contains("test"));
        assert_eq!(info.size_in_bytes, Some(4096));
    }

    #[test]
    fn info_without_configs_is_not_found() {
        let resp: InfoResponse = serde_json::from_value(json!({"dataset_info": {}})).unwrap();
        assert!(matches!(into_info("x/y", resp), Err(HubError::NotFound(_))));
    }

    #[test]
    fn rows_are_flattened() {
        let resp: RowsResponse = serde_json::from_value(json!({
            "rows": [{"row_idx": 0, "row": {"q": "hi", "n": 3, "none": null}, "truncated_cells": []}],
            "num_rows_total": 10
        }))
        .unwrap();
        let raw = flatten(&resp.rows[0].row);
        assert_eq!(raw["q"], "hi");
        assert_eq!(raw["n"], "3");
        assert_eq!(raw["none"], "");
        assert_eq!(resp.num_rows_total, 10);
    }
}
