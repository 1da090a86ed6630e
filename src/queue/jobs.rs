// Job messages exchanged between the API and the worker

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Concept, GenerateConceptRequest, RefineConceptRequest, Task, TaskType};
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptJob {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub user_id: Uuid,
    pub logo_description: String,
    pub theme_description: String,
    pub num_palettes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_concept_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preserve_aspects: Vec<String>,
}

impl ConceptJob {
    pub fn generate(task: &Task, request: &GenerateConceptRequest) -> Self {
        Self {
            task_id: task.id,
            task_type: TaskType::Generate,
            user_id: task.user_id,
            logo_description: request.logo_description.clone(),
            theme_description: request.theme_description.clone(),
            num_palettes: request.num_palettes,
            original_concept_id: None,
            refinement_prompt: None,
            preserve_aspects: Vec::new(),
        }
    }

    /// Descriptions missing from the request fall back to the original concept's.
    pub fn refine(task: &Task, request: &RefineConceptRequest, original: &Concept) -> Self {
        Self {
            task_id: task.id,
            task_type: TaskType::Refine,
            user_id: task.user_id,
            logo_description: request
                .logo_description
                .clone()
                .unwrap_or_else(|| original.logo_description.clone()),
            theme_description: request
                .theme_description
                .clone()
                .unwrap_or_else(|| original.theme_description.clone()),
            num_palettes: request.num_palettes,
            original_concept_id: Some(original.id),
            refinement_prompt: Some(request.refinement_prompt.clone()),
            preserve_aspects: request.preserve_aspects.clone(),
        }
    }
}

/// Pub/Sub style push envelope: the job JSON travels base64-encoded in `data`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub message: EnvelopeMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    pub data: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

pub fn encode_job(job: &ConceptJob) -> AppResult<String> {
    let json = serde_json::to_vec(job)
        .map_err(|e| AppError::Internal(format!("Failed to serialize job: {}", e)))?;
    let envelope = JobEnvelope {
        message: EnvelopeMessage {
            data: STANDARD.encode(json),
            attributes: HashMap::from([
                ("task_type".to_string(), job.task_type.to_string()),
                ("task_id".to_string(), job.task_id.to_string()),
            ]),
        },
    };
    serde_json::to_string(&envelope)
        .map_err(|e| AppError::Internal(format!("Failed to serialize envelope: {}", e)))
}

pub fn decode_job(payload: &str) -> AppResult<ConceptJob> {
    let envelope: JobEnvelope = serde_json::from_str(payload)
        .map_err(|e| AppError::Validation(format!("Malformed job envelope: {}", e)))?;
    let json = STANDARD
        .decode(envelope.message.data.as_bytes())
        .map_err(|e| AppError::Validation(format!("Job data is not base64: {}", e)))?;
    serde_json::from_slice(&json)
        .map_err(|e| AppError::Validation(format!("Malformed job: {}", e)))
}
