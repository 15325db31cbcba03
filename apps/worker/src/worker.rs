//! The long-lived queue consumer.
//!
//! Each worker process runs `concurrency` consumer loops over its bound
//! queues. A job goes through: fetch audio → convert to wav → engine (under
//! the GPU lock) → post-processing → call-store update → index write →
//! notifications. The broker message is acked only after the index write,
//! so a crash anywhere earlier redelivers the job intact.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};
use trunkscribe_config::WorkerConfig;
use trunkscribe_metadata::AudioType;
use trunkscribe_notify::{NotificationClient, NotificationPayload};
use trunkscribe_queue::{jittered_backoff, Broker, CallAudio, CallJob, Delivery, RedisBroker};
use trunkscribe_radio::{analog, digital, RadioError, ShaperConfig};
use trunkscribe_search::{SearchEngine, SearchError};
use trunkscribe_storage::{convert_to_wav, BlobStorage, CallStoreClient, StorageError};
use trunkscribe_transcript::Transcript;
use trunkscribe_whisper::{EngineRegistry, WhisperError};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("audio type {0} not supported")]
    UnsupportedAudioType(String),
    #[error(transparent)]
    Radio(#[from] RadioError),
    #[error(transparent)]
    Whisper(#[from] WhisperError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Queue(#[from] trunkscribe_queue::QueueError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Terminal failures are acked and recorded; retrying cannot fix them.
    fn is_terminal(&self) -> bool {
        match self {
            JobError::UnsupportedAudioType(_) => true,
            JobError::Radio(err) => err.is_terminal(),
            JobError::Whisper(err) => err.is_terminal(),
            _ => false,
        }
    }

    /// Fatal failures abort the process (missing credentials, bad config).
    fn is_fatal(&self) -> bool {
        match self {
            JobError::Whisper(err) => err.is_fatal(),
            _ => false,
        }
    }
}

pub struct Worker {
    config: WorkerConfig,
    broker: Arc<RedisBroker>,
    registry: Arc<EngineRegistry>,
    default_implementation: String,
    search: Arc<dyn SearchEngine>,
    blob: Arc<BlobStorage>,
    call_store: Option<Arc<CallStoreClient>>,
    notifier: Arc<NotificationClient>,
    digital_shaper: ShaperConfig,
    analog_shaper: ShaperConfig,
    health: Arc<crate::health::HealthCounters>,
}

impl Worker {
    pub async fn new(config: WorkerConfig) -> anyhow::Result<Self> {
        let broker = Arc::new(RedisBroker::connect(&config.broker_url).await?);
        let registry = Arc::new(EngineRegistry::new());

        // Pin the default engine now: a worker that cannot load its model
        // should die before consuming anything.
        let default_implementation = trunkscribe_whisper::default_implementation()?;
        registry.get(&default_implementation)?;

        let search: Arc<dyn SearchEngine> = Arc::from(trunkscribe_search::default_engine()?);
        let blob = Arc::new(BlobStorage::from_env()?);
        let call_store = match &config.api_base_url {
            Some(base_url) => Some(Arc::new(CallStoreClient::new(base_url)?)),
            None => None,
        };
        let notifier = Arc::new(NotificationClient::from_env()?);

        let decode = trunkscribe_whisper::load_decode_options();
        let cleanup_config = trunkscribe_whisper::load_cleanup_config();
        let digital_shaper = ShaperConfig {
            vad_filter: config.vad_filter_digital,
            decode: decode.clone(),
            cleanup_config: cleanup_config.clone(),
        };
        let analog_shaper = ShaperConfig {
            vad_filter: config.vad_filter_analog,
            decode,
            cleanup_config,
        };

        Ok(Self {
            config,
            broker,
            registry,
            default_implementation,
            search,
            blob,
            call_store,
            notifier,
            digital_shaper,
            analog_shaper,
            health: Arc::new(crate::health::HealthCounters::default()),
        })
    }

    /// Spawn the consumer loops and run until shutdown is requested.
    pub async fn run(self: Arc<Self>) {
        info!(
            hostname = %self.config.hostname,
            queues = ?self.config.queues,
            concurrency = self.config.concurrency,
            implementation = %self.default_implementation,
            "worker started"
        );

        let mut handles = Vec::new();
        for slot in 0..self.config.concurrency {
            let worker = self.clone();
            handles.push(tokio::spawn(async move {
                worker.consume_loop(slot).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn consume_loop(&self, slot: usize) {
        loop {
            if self.health.should_terminate() {
                let (success, failure, retry) = self.health.snapshot();
                error!(
                    success,
                    failure, retry, "exceeded job failure threshold, exiting"
                );
                std::process::exit(1);
            }

            for queue in &self.config.queues {
                if let Err(err) = self.broker.heartbeat(queue, &self.config.hostname).await {
                    warn!(queue, %err, "heartbeat failed");
                }

                let delivery = match self.broker.consume(queue, &self.config.hostname).await {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(queue, %err, "consume failed, backing off");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                debug!(slot, queue, job = %delivery.envelope.id, "picked up job");
                self.handle_delivery(delivery).await;
            }
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let job_id = delivery.envelope.id;
        match self.process_job(&delivery.envelope.job).await {
            Ok(transcript) => {
                if let Err(err) = self.broker.ack(&delivery).await {
                    warn!(job = %job_id, %err, "ack failed; job may be redelivered");
                }
                self.health.record_success();
                info!(job = %job_id, transcript = %transcript, "job finished");
            }
            Err(err) if err.is_fatal() => {
                // Leave the message unacked so a healthy peer picks it up.
                error!(job = %job_id, %err, "fatal configuration error");
                std::process::exit(1);
            }
            Err(err) if err.is_terminal() => {
                warn!(job = %job_id, %err, "job failed terminally");
                if let Err(ack_err) = self.broker.ack(&delivery).await {
                    warn!(job = %job_id, %ack_err, "ack failed");
                }
                self.health.record_failure();
            }
            Err(err) => {
                if delivery.envelope.attempts_exhausted() {
                    error!(
                        job = %job_id,
                        attempts = delivery.envelope.attempts,
                        %err,
                        "giving up after max retries"
                    );
                    if let Err(ack_err) = self.broker.ack(&delivery).await {
                        warn!(job = %job_id, %ack_err, "ack failed");
                    }
                    self.health.record_failure();
                } else {
                    let retry_at =
                        now_epoch() + jittered_backoff(delivery.envelope.attempts + 1) as i64;
                    warn!(
                        job = %job_id,
                        attempts = delivery.envelope.attempts,
                        retry_at,
                        %err,
                        "job failed, scheduling retry"
                    );
                    if let Err(nack_err) = self.broker.nack(&delivery, retry_at).await {
                        warn!(job = %job_id, %nack_err, "nack failed");
                    }
                    self.health.record_retry();
                }
            }
        }
    }

    /// One end-to-end transcription. Temp files live in a per-job directory
    /// removed on every exit path.
    async fn process_job(&self, job: &CallJob) -> Result<String, JobError> {
        let workdir = tempfile::tempdir()?;

        // Fetch (or inline-decode) the source audio.
        let source_path = workdir.path().join("call.audio");
        let mut raw_audio_url = match &job.audio {
            CallAudio::Url(url) => {
                self.blob.fetch_audio(url, &source_path).await?;
                Some(url.clone())
            }
            CallAudio::Inline(encoded) => {
                let bytes = CallAudio::decode_inline(encoded)?;
                tokio::fs::write(&source_path, bytes).await?;
                None
            }
        };

        let wav_path = convert_to_wav(&source_path).await?;

        // Fresh uploads need the archive copy before the source is deleted.
        if raw_audio_url.is_none() {
            raw_audio_url = Some(self.blob.upload_raw_audio(&job.metadata, &source_path).await?);
        }
        tokio::fs::remove_file(&source_path).await?;
        let raw_audio_url = raw_audio_url.unwrap_or_default();

        let implementation = job
            .whisper_implementation
            .as_deref()
            .unwrap_or(&self.default_implementation);
        let engine = self.registry.get(implementation)?;

        // The engine call is the only GPU-bound phase; everything around it
        // stays outside the lock.
        let transcript: Transcript = {
            let _guard = self.registry.gpu_lock().lock().await;
            match job.metadata.audio_type {
                AudioType::Digital => {
                    digital::transcribe_call(
                        engine.as_ref(),
                        &wav_path,
                        &job.metadata,
                        &self.digital_shaper,
                        "en",
                    )
                    .await?
                }
                AudioType::Analog => {
                    analog::transcribe_call(
                        engine.as_ref(),
                        &wav_path,
                        "",
                        &self.analog_shaper,
                        "en",
                    )
                    .await?
                }
                other => {
                    return Err(JobError::UnsupportedAudioType(other.as_str().to_string()));
                }
            }
        };
        debug!(transcript = %transcript.txt(), "transcription complete");

        if let (Some(call_id), Some(call_store)) = (job.call_id, &self.call_store) {
            call_store.update_transcript(call_id, &transcript, None).await?;
        }

        let search_url = self
            .search
            .index_call(
                job.call_id.map(|id| id.to_string()),
                &job.metadata,
                &raw_audio_url,
                &transcript,
                None,
                job.index_name.as_deref(),
            )
            .await?;

        // A present id marks a reprocess; those were announced the first
        // time around.
        if job.call_id.is_none() && self.notifier.is_enabled() {
            let payload = NotificationPayload::new(
                &transcript,
                &job.metadata,
                None,
                &raw_audio_url,
                &search_url,
            );
            self.notifier.send(&payload).await;
        }

        Ok(transcript.txt())
    }

    /// Make sure the current index exists and pre-create next month's when
    /// the boundary is near.
    pub async fn ensure_indexes(&self) {
        let current = trunkscribe_search::default_index_name(None);
        if let Err(err) = self.search.create_or_update_index(&current).await {
            warn!(index = %current, %err, "index bootstrap failed");
        }
        if let Err(err) = self.search.make_next_index().await {
            warn!(%err, "next-index pre-creation failed");
        }
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
