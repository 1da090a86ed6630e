// Worker: consumes concept jobs and runs the generation pipeline

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::ai::{ConceptBrief, ConceptGenerator, RefinementBrief};
use crate::db::ConceptRepository;
use crate::models::{NewColorVariation, NewConcept, StoredConcept, TaskType};
use crate::queue::{decode_job, ConceptJob, JobConsumer};
use crate::services::TaskService;
use crate::storage::{
    concept_image_path, palette_image_path, Buckets, ObjectStore, PNG_CONTENT_TYPE,
};
use crate::types::{AppError, AppResult};

const POLL_TIMEOUT: Duration = Duration::from_secs(5);
const CONSUMER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { concept_id: Uuid },
    Failed { error: String },
    /// The task was not pending, e.g. a redelivered message.
    Skipped,
    /// The task reached a terminal status elsewhere (the stale sweeper)
    /// while the job ran; its results were discarded.
    Expired,
}

/// Objects written during one job, removed again if the job fails.
#[derive(Default)]
struct Uploads {
    written: Vec<(String, String)>,
}

pub struct Worker {
    tasks: TaskService,
    concepts: Arc<dyn ConceptRepository>,
    store: Arc<dyn ObjectStore>,
    generator: Arc<dyn ConceptGenerator>,
    buckets: Buckets,
}

impl Worker {
    pub fn new(
        tasks: TaskService,
        concepts: Arc<dyn ConceptRepository>,
        store: Arc<dyn ObjectStore>,
        generator: Arc<dyn ConceptGenerator>,
        buckets: Buckets,
    ) -> Self {
        Self {
            tasks,
            concepts,
            store,
            generator,
            buckets,
        }
    }

    /// Run `concurrency` consumers until `shutdown` flips to true.
    pub async fn run(
        self: Arc<Self>,
        consumer: Arc<dyn JobConsumer>,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) {
        let concurrency = concurrency.max(1);
        info!(concurrency, "Worker started");

        let mut consumers = JoinSet::new();
        for slot in 0..concurrency {
            let worker = self.clone();
            let consumer = consumer.clone();
            let shutdown = shutdown.clone();
            consumers.spawn(
                async move { worker.consume(consumer, shutdown).await }
                    .instrument(tracing::info_span!("consumer", slot)),
            );
        }

        while let Some(result) = consumers.join_next().await {
            if let Err(e) = result {
                error!("Consumer task ended abnormally: {}", e);
            }
        }
        info!("Worker stopped");
    }

    async fn consume(&self, consumer: Arc<dyn JobConsumer>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let message = tokio::select! {
                _ = shutdown.changed() => break,
                message = consumer.next_message(POLL_TIMEOUT) => message,
            };

            match message {
                Ok(Some(payload)) => {
                    self.handle_message(&payload).await;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to read from queue: {}", e);
                    tokio::time::sleep(CONSUMER_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Decode one raw queue message and process it. Undecodable messages are dropped.
    pub async fn handle_message(&self, payload: &str) -> Option<JobOutcome> {
        let job = match decode_job(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!("Dropping undecodable message: {}", e);
                return None;
            }
        };

        let span = tracing::info_span!("job", task_id = %job.task_id, task_type = %job.task_type);
        match self.process_job(job).instrument(span).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                // Only task bookkeeping errors end up here
                error!("Failed to record job outcome: {}", e);
                None
            }
        }
    }

    pub async fn process_job(&self, job: ConceptJob) -> AppResult<JobOutcome> {
        if self.tasks.claim_task(job.task_id).await?.is_none() {
            info!("Task is not pending, skipping delivery");
            return Ok(JobOutcome::Skipped);
        }
        info!("Processing job");

        let mut uploads = Uploads::default();
        let result = match job.task_type {
            TaskType::Generate => self.process_generation(&job, &mut uploads).await,
            TaskType::Refine => self.process_refinement(&job, &mut uploads).await,
        };

        match result {
            Ok(stored) => {
                let concept_id = stored.concept.id;
                match self.tasks.mark_completed(job.task_id, concept_id).await {
                    Ok(Some(_)) => {
                        info!(%concept_id, variations = stored.variations.len(), "Job completed");
                        Ok(JobOutcome::Completed { concept_id })
                    }
                    Ok(None) => {
                        warn!(%concept_id, "Task finished elsewhere while processing, discarding results");
                        self.discard_concept(concept_id, uploads).await;
                        Ok(JobOutcome::Expired)
                    }
                    Err(e) => {
                        error!(%concept_id, error = %e, "Failed to complete task, discarding results");
                        self.discard_concept(concept_id, uploads).await;
                        if let Err(mark_err) = self
                            .tasks
                            .mark_failed(job.task_id, format!("Failed to record result: {}", e))
                            .await
                        {
                            error!(error = %mark_err, "Failed to mark task as failed");
                        }
                        Err(e)
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Job failed");
                self.discard_uploads(uploads).await;
                self.tasks.mark_failed(job.task_id, message.clone()).await?;
                Ok(JobOutcome::Failed { error: message })
            }
        }
    }

    async fn process_generation(
        &self,
        job: &ConceptJob,
        uploads: &mut Uploads,
    ) -> AppResult<StoredConcept> {
        let brief = brief_of(job);
        let base = self.generator.generate_image(&brief).await?;
        self.persist_concept(job, &brief, base, None, uploads).await
    }

    async fn process_refinement(
        &self,
        job: &ConceptJob,
        uploads: &mut Uploads,
    ) -> AppResult<StoredConcept> {
        let original_id = job.original_concept_id.ok_or_else(|| {
            AppError::Validation("refinement job without original_concept_id".to_string())
        })?;
        let refinement_prompt = job.refinement_prompt.clone().ok_or_else(|| {
            AppError::Validation("refinement job without refinement_prompt".to_string())
        })?;

        let original = self
            .concepts
            .find_for_user(original_id, job.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("concept {}", original_id)))?;
        let original_image = self
            .store
            .download(&self.buckets.concept, &original.concept.image_path)
            .await?;

        let brief = brief_of(job);
        let refinement = RefinementBrief {
            brief: brief.clone(),
            refinement_prompt: refinement_prompt.clone(),
            preserve_aspects: job.preserve_aspects.clone(),
        };
        let refined = self.generator.refine_image(&original_image, &refinement).await?;

        self.persist_concept(
            job,
            &brief,
            refined,
            Some((original_id, refinement_prompt)),
            uploads,
        )
        .await
    }

    /// Palettes, recoloured variations, uploads and the metadata rows for a new base image.
    async fn persist_concept(
        &self,
        job: &ConceptJob,
        brief: &ConceptBrief,
        base: Bytes,
        refined_from: Option<(Uuid, String)>,
        uploads: &mut Uploads,
    ) -> AppResult<StoredConcept> {
        let count = usize::try_from(job.num_palettes)
            .map_err(|_| AppError::Validation("num_palettes out of range".to_string()))?;
        let palettes = self.generator.generate_palettes(brief, count).await?;

        let mut rendered = Vec::with_capacity(palettes.len());
        for palette in palettes {
            let image = self.generator.recolor_image(&base, &palette).await?;
            rendered.push((palette, image));
        }

        let concept_id = Uuid::new_v4();
        let image_path = concept_image_path(job.user_id, concept_id);
        self.upload(&self.buckets.concept, &image_path, base, uploads)
            .await?;

        let mut variations = Vec::with_capacity(rendered.len());
        for (index, (palette, image)) in rendered.into_iter().enumerate() {
            let path = palette_image_path(job.user_id, concept_id, index);
            self.upload(&self.buckets.palette, &path, image, uploads)
                .await?;
            let position = i32::try_from(index)
                .map_err(|_| AppError::Validation("too many palettes".to_string()))?;
            variations.push(NewColorVariation {
                position,
                palette_name: palette.name,
                colors: palette.colors,
                description: palette.description,
                image_path: path,
            });
        }

        let (refined_from, refinement_prompt) = match refined_from {
            Some((id, prompt)) => (Some(id), Some(prompt)),
            None => (None, None),
        };
        self.concepts
            .insert_with_variations(
                NewConcept {
                    id: concept_id,
                    user_id: job.user_id,
                    logo_description: job.logo_description.clone(),
                    theme_description: job.theme_description.clone(),
                    image_path,
                    refined_from,
                    refinement_prompt,
                },
                variations,
            )
            .await
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        uploads: &mut Uploads,
    ) -> AppResult<()> {
        self.store
            .upload(bucket, path, data, PNG_CONTENT_TYPE)
            .await?;
        uploads.written.push((bucket.to_string(), path.to_string()));
        Ok(())
    }

    /// Remove a concept that was saved but whose task could not complete.
    async fn discard_concept(&self, concept_id: Uuid, uploads: Uploads) {
        if let Err(e) = self.concepts.delete(concept_id).await {
            warn!(%concept_id, error = %e, "Failed to remove concept of unfinished task");
        }
        self.discard_uploads(uploads).await;
    }

    async fn discard_uploads(&self, uploads: Uploads) {
        for (bucket, path) in uploads.written {
            if let Err(e) = self.store.delete(&bucket, &path).await {
                warn!(%bucket, %path, error = %e, "Failed to remove object from failed job");
            }
        }
    }
}

fn brief_of(job: &ConceptJob) -> ConceptBrief {
    ConceptBrief {
        logo_description: job.logo_description.clone(),
        theme_description: job.theme_description.clone(),
    }
}
