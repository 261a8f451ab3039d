//! HTTP transport for [`LearningApi`].

use super::types::{
    CompileOutput, CompileRequest, Concept, DeleteLessonResponse, FrontierConcept,
    LessonResponse, MasteryUpdate, MasteryUpdateResult, NextLesson, RegenerateRequest,
    RegeneratedLesson, UserProgress,
};
use super::LearningApiError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

enum Verb {
    Get,
    Post(String),
    Delete,
}

/// A successful response, read to the end.
struct Reply {
    endpoint: String,
    content_type: Option<String>,
    body: String,
}

impl Reply {
    fn is_text(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("text/plain"))
    }

    fn json<T: DeserializeOwned>(&self) -> Result<T, LearningApiError> {
        serde_json::from_str(&self.body).map_err(|e| LearningApiError::Decode {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })
    }
}

pub struct LearningApi {
    base: Url,
    agent: ureq::Agent,
    user_agent: String,
}

impl LearningApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LearningApiError> {
        let base = Url::parse(base_url).map_err(|e| LearningApiError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(LearningApiError::InvalidUrl {
                url: base_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            });
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            base,
            agent,
            user_agent: format!(
                "compile-session/{} ({})",
                env!("CARGO_PKG_VERSION"),
                crate::BUILD_SHA
            ),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Concepts whose prerequisites the user has mastered.
    pub fn frontier(&self, user_id: &str) -> Result<Vec<FrontierConcept>, LearningApiError> {
        self.get(&["frontier", user_id], &[])?.json()
    }

    pub fn next_lesson(
        &self,
        user_id: &str,
        category: Option<&str>,
    ) -> Result<NextLesson, LearningApiError> {
        self.get(&["next", user_id], &[("category", category)])?
            .json()
    }

    pub fn progress(&self, user_id: &str) -> Result<UserProgress, LearningApiError> {
        self.get(&["progress", user_id], &[])?.json()
    }

    /// Mermaid source of the knowledge graph, optionally colored by a
    /// user's mastery.
    pub fn visualization(&self, user_id: Option<&str>) -> Result<String, LearningApiError> {
        let reply = self.get(&["visualize"], &[("userId", user_id)])?;
        if reply.is_text() {
            return Ok(reply.body);
        }
        // Some deployments wrap the diagram in a JSON string.
        match serde_json::from_str::<String>(&reply.body) {
            Ok(text) => Ok(text),
            Err(_) => Ok(reply.body),
        }
    }

    pub fn concept(&self, concept_id: &str) -> Result<Concept, LearningApiError> {
        self.get(&["concept", concept_id], &[])?.json()
    }

    pub fn concepts(&self) -> Result<Vec<Concept>, LearningApiError> {
        self.get(&["concepts"], &[])?.json()
    }

    /// Fetches the lesson for a concept, generating it on first request.
    pub fn lesson(
        &self,
        concept_id: &str,
        model: Option<&str>,
    ) -> Result<LessonResponse, LearningApiError> {
        self.get(&["lesson", concept_id], &[("model", model)])?
            .json()
    }

    pub fn regenerate_lesson(
        &self,
        concept_id: &str,
        model: Option<&str>,
        force: bool,
    ) -> Result<RegeneratedLesson, LearningApiError> {
        let request = RegenerateRequest {
            concept_id,
            model,
            force,
        };
        self.post(&["lesson", "generate"], &request)?.json()
    }

    pub fn delete_lesson(&self, concept_id: &str) -> Result<DeleteLessonResponse, LearningApiError> {
        let url = self.url(&["lesson", concept_id], &[])?;
        self.send(url, Verb::Delete)?.json()
    }

    pub fn update_mastery(
        &self,
        update: &MasteryUpdate,
    ) -> Result<MasteryUpdateResult, LearningApiError> {
        self.post(&["mastery"], update)?.json()
    }

    /// Compiles and runs `code` in one request, without streaming.
    pub fn compile(&self, language: &str, code: &str) -> Result<CompileOutput, LearningApiError> {
        let request = CompileRequest {
            language: language.to_string(),
            code: code.to_string(),
        };
        self.post(&["compile"], &request)?.json()
    }

    pub fn is_backend_available(&self) -> bool {
        match self.get(&[], &[]) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "backend health check failed");
                false
            }
        }
    }

    fn get(&self, segments: &[&str], query: &[(&str, Option<&str>)]) -> Result<Reply, LearningApiError> {
        let url = self.url(segments, query)?;
        self.send(url, Verb::Get)
    }

    fn post(&self, segments: &[&str], body: &impl Serialize) -> Result<Reply, LearningApiError> {
        let url = self.url(segments, &[])?;
        let body = serde_json::to_string(body).map_err(|e| LearningApiError::Decode {
            endpoint: endpoint_of(&url),
            reason: format!("could not encode request: {}", e),
        })?;
        self.send(url, Verb::Post(body))
    }

    /// Appends percent-encoded path segments and the present query
    /// parameters to the base URL.
    fn url(&self, segments: &[&str], query: &[(&str, Option<&str>)]) -> Result<Url, LearningApiError> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| LearningApiError::InvalidUrl {
                    url: self.base.to_string(),
                    reason: "URL cannot carry a path".to_string(),
                })?;
            path.pop_if_empty().extend(segments);
        }
        if segments.is_empty() && !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }

        let present: Vec<(&str, &str)> = query
            .iter()
            .filter_map(|(key, value)| value.map(|v| (*key, v)))
            .collect();
        if !present.is_empty() {
            url.query_pairs_mut().extend_pairs(present);
        }
        Ok(url)
    }

    fn send(&self, url: Url, verb: Verb) -> Result<Reply, LearningApiError> {
        let endpoint = endpoint_of(&url);
        tracing::debug!(%endpoint, "learning api request");

        let result = match verb {
            Verb::Get => self
                .agent
                .get(url.as_str())
                .header("User-Agent", &self.user_agent)
                .header("Accept", "application/json")
                .call(),
            Verb::Delete => self
                .agent
                .delete(url.as_str())
                .header("User-Agent", &self.user_agent)
                .call(),
            Verb::Post(body) => self
                .agent
                .post(url.as_str())
                .header("User-Agent", &self.user_agent)
                .header("Content-Type", "application/json")
                .send(body.as_str()),
        };

        let mut response = result.map_err(|e| {
            tracing::debug!(%endpoint, error = %e, "learning server unreachable");
            LearningApiError::Unavailable {
                reason: e.to_string(),
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| LearningApiError::Decode {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        if status == 404 {
            return Err(LearningApiError::NotFound { endpoint });
        }
        if !(200..300).contains(&status) {
            tracing::warn!(%endpoint, status, "learning api request failed");
            return Err(LearningApiError::Request {
                status,
                message: error_message(status, &body),
            });
        }

        Ok(Reply {
            endpoint,
            content_type,
            body,
        })
    }
}

/// Path and query of a request URL, as shown in errors.
fn endpoint_of(url: &Url) -> String {
    url[url::Position::BeforePath..].to_string()
}

/// The `error` field of a JSON error body, else a generic message.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("Request failed: {}", status))
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
