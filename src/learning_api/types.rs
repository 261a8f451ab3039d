//! Wire types of the learning service REST API.

use serde::{Deserialize, Serialize};

/// A node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub complexity: f64,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// A concept the user can learn next, with their current mastery score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierConcept {
    #[serde(flatten)]
    pub concept: Concept,
    #[serde(default)]
    pub current_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextLesson {
    pub lesson: Option<FrontierConcept>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub total: u32,
    pub mastered: u32,
    pub in_progress: u32,
    pub not_started: u32,
    pub average_mastery: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarterFile {
    pub path: String,
    pub content: String,
}

/// The exercise attached to a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationTask {
    pub description: String,
    pub expected_output: String,
    #[serde(default)]
    pub validation_criteria: Vec<String>,
    #[serde(default)]
    pub starter_files: Vec<StarterFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedLesson {
    pub concept_id: String,
    pub title: String,
    pub markdown: String,
    pub verification_task: VerificationTask,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonResponse {
    pub lesson: GeneratedLesson,
    /// Whether the server returned a previously generated lesson.
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegeneratedLesson {
    pub lesson: GeneratedLesson,
    #[serde(default)]
    pub regenerated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteLessonResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegenerateRequest<'a> {
    pub concept_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub force: bool,
}

/// Outcome of a lesson attempt, reported to update mastery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryUpdate {
    pub user_id: String,
    pub concept_id: String,
    pub success: bool,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryUpdateResult {
    pub previous_score: f64,
    pub new_score: f64,
    pub mastered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileRequest {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Result of a one-shot, non-streaming compile and run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOutput {
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub run_output: Option<RunOutput>,
}
