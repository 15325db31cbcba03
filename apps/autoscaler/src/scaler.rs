//! Elastic GPU fleet controller.
//!
//! A telemetry task samples the broker every two seconds; the control loop
//! wakes every `interval` seconds, cleans up dead or misbehaving instances,
//! and moves the fleet toward the size the queue pressure asks for. Hosts
//! that got stuck or errored go on a forbidden list that survives restarts.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::json;
use tracing::{error, info, warn};
use trunkscribe_queue::{Broker, QueueStatus, RedisBroker, TelemetryClient, TRANSCRIBE_QUEUE};

use crate::vast::{Instance, Offer, VastClient};
use crate::{Result, ScalerError};

pub const DEFAULT_MIN_INSTANCES: u32 = 1;
pub const DEFAULT_MAX_INSTANCES: u32 = 10;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_FORBIDDEN_PATH: &str = "config/forbidden_instances.json";

/// An instance still in `loading` after this long is stuck.
const MAX_LOADING_SECS: f64 = 1200.0;
/// Extra grace before a `running` instance missing from the consumer list
/// counts as disconnected.
const DISCONNECT_GRACE_SECS: f64 = 300.0;
const DISK_FULL_RATIO: f64 = 0.9;

/// Scale-up triggers.
const INGRESS_RATE_THRESHOLD: f64 = 0.4;
const DEPTH_THRESHOLD: u64 = 400;
const DRAIN_SECS_THRESHOLD: f64 = 120.0;
/// Scale-down triggers.
const DRAIN_RATE_THRESHOLD: f64 = -0.5;
const DRAIN_DEPTH_THRESHOLD: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionReason {
    ReduceReplicas,
    Disconnected,
    StuckLoading,
    Error,
    Exited,
    DiskSpaceFull,
}

impl DeletionReason {
    /// Exact spellings; downstream observability matches on these.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionReason::ReduceReplicas => "reduce_replicas",
            DeletionReason::Disconnected => "disconnected",
            DeletionReason::StuckLoading => "stuck_loading",
            DeletionReason::Error => "error",
            DeletionReason::Exited => "exited",
            DeletionReason::DiskSpaceFull => "disk_space_full",
        }
    }
}

/// How many instances the queue wants, before clamping.
///
/// Precedence: ingress pressure (or no consumers at all) scales up; a deep
/// queue draining too slowly scales up; sustained drain with an empty queue
/// scales down; otherwise hold.
pub fn calculate_needed_instances(status: &QueueStatus, message_rate: f64) -> i64 {
    let current = status.consumers as i64;

    if message_rate > INGRESS_RATE_THRESHOLD || status.consumers == 0 {
        return current + 1;
    }
    if status.messages > DEPTH_THRESHOLD && status.consumers > 0 {
        let ack_rate_per_consumer = status.ack_rate() / status.consumers as f64;
        let time_to_clear = if ack_rate_per_consumer > 0.0 {
            status.messages as f64 / ack_rate_per_consumer
        } else {
            f64::INFINITY
        };
        if time_to_clear > DRAIN_SECS_THRESHOLD {
            return current + 1;
        }
        return current;
    }
    if message_rate < DRAIN_RATE_THRESHOLD && status.messages < DRAIN_DEPTH_THRESHOLD {
        return current - 1;
    }
    current
}

/// GPU memory floor in MiB for a model, shrunk by the implementation's
/// quantization factor.
pub fn vram_required(model: &str, implementation: &str) -> Result<f64> {
    // Local ggml-based implementations run quantized.
    let mem_util_factor = match implementation {
        "whisper-rs" | "whisper-cpp" => 0.4,
        _ => 1.0,
    };
    let base_mib = match model {
        "tiny.en" => 1.5 * 1024.0,
        "base.en" => 2.0 * 1024.0,
        "small.en" => 3.5 * 1024.0,
        "medium.en" => 6.5 * 1024.0,
        "large" | "large-v2" | "large-v3" => 12.0 * 1024.0,
        other => return Err(ScalerError::UnknownModel(other.to_string())),
    };
    Ok(base_mib * mem_util_factor)
}

/// Workers per instance: as many engine slots as the GPU memory fits.
pub fn concurrency_for(gpu_ram: f64, vram_required: f64) -> u32 {
    ((gpu_ram / vram_required).floor() as u32).max(1)
}

/// Bid 1.25x the minimum, rounded to micro-dollars, never below $0.001/hr.
pub fn bid_price(dph_total: f64) -> f64 {
    let bid = (dph_total * 1.25 * 1e6).round() / 1e6;
    bid.max(0.001)
}

/// Decide whether an instance must go, mirroring the cleanup pass order:
/// the most specific reason assigned last wins.
pub fn classify_deletable(
    instance: &Instance,
    now_epoch: f64,
    online_workers: &str,
    delete_exited: bool,
    delete_errored: bool,
) -> Option<(DeletionReason, bool)> {
    let age = instance
        .start_date
        .map(|start| now_epoch - start)
        .unwrap_or(0.0);

    let is_disconnected = instance.is_running()
        && age > MAX_LOADING_SECS + DISCONNECT_GRACE_SECS
        && !online_workers.contains(&instance.hostname());
    let is_stuck = instance.actual_status.as_deref() == Some("loading") && age > MAX_LOADING_SECS;
    let is_full = match (instance.disk_usage, instance.disk_space) {
        (Some(usage), Some(space)) if space > 0.0 => usage / space > DISK_FULL_RATIO,
        _ => false,
    };
    let is_errored = instance
        .status_msg
        .as_deref()
        .map(|message| message.to_lowercase().contains("error"))
        .unwrap_or(false);

    let errored = delete_errored && (is_stuck || is_disconnected || is_errored);
    let exited = delete_exited
        && (instance.actual_status.as_deref() == Some("exited")
            || instance.cur_state.as_deref() == Some("stopped"));

    if !(errored || exited || is_full) {
        return None;
    }

    let mut reason = None;
    if is_disconnected {
        reason = Some(DeletionReason::Disconnected);
    }
    if is_stuck {
        reason = Some(DeletionReason::StuckLoading);
    }
    if is_errored {
        reason = Some(DeletionReason::Error);
    }
    if exited {
        reason = Some(DeletionReason::Exited);
    }
    if is_full {
        reason = Some(DeletionReason::DiskSpaceFull);
    }

    // Stuck or errored hosts earn a spot on the forbidden list.
    reason.map(|reason| (reason, is_stuck || is_errored))
}

#[derive(Debug, Clone)]
pub struct Options {
    pub min: u32,
    pub max: u32,
    pub interval_secs: u64,
    pub image: Option<String>,
}

pub struct Autoscaler {
    options: Options,
    vast: VastClient,
    telemetry: Arc<TelemetryClient>,
    broker: RedisBroker,
    envs: BTreeMap<String, String>,
    model: String,
    implementation: String,
    image: String,
    git_commit: String,
    forbidden_path: PathBuf,
    forbidden_instances: HashSet<String>,
    running_instances: Vec<String>,
    pending_instances: HashMap<String, u32>,
    message_rates: Arc<Mutex<VecDeque<f64>>>,
}

impl Autoscaler {
    pub async fn new(options: Options) -> Result<Self> {
        let api_key = match std::env::var("VAST_API_KEY") {
            Ok(key) => key,
            Err(_) => {
                let path = format!(
                    "{}/.vast_api_key",
                    std::env::var("HOME").unwrap_or_default()
                );
                std::fs::read_to_string(&path)
                    .map_err(|_| ScalerError::Config("VAST_API_KEY env must be set".into()))?
            }
        };
        let vast = VastClient::new(api_key.trim().to_string())?;

        let broker_api = std::env::var("FLOWER_BROKER_API")
            .map_err(|_| ScalerError::Config("FLOWER_BROKER_API env must be set".into()))?;
        let telemetry = Arc::new(TelemetryClient::new(&broker_api)?);

        let broker_url = std::env::var("CELERY_BROKER_URL")
            .map_err(|_| ScalerError::Config("CELERY_BROKER_URL env must be set".into()))?;
        let broker = RedisBroker::connect(&broker_url).await?;

        let model = std::env::var("WHISPER_MODEL").unwrap_or_else(|_| "large-v3".to_string());
        let implementation = std::env::var("WHISPER_IMPLEMENTATION")
            .unwrap_or_else(|_| "whisper-rs".to_string())
            .split(':')
            .next()
            .unwrap_or("whisper-rs")
            .to_string();

        // Workers on rented hosts must reach the broker over the public
        // address, not the compose-internal one.
        let public_hostname = Self::public_hostname().await?;
        let mut envs: BTreeMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("CELERY"))
            .map(|(key, value)| (key, value.replace("rabbitmq", &public_hostname)))
            .collect();
        envs.insert("CELERY_QUEUES".into(), TRANSCRIBE_QUEUE.into());

        let cuda_version = std::env::var("CUDA_VERSION").unwrap_or_else(|_| "12.1.0".to_string());
        let image = options.image.clone().unwrap_or_else(|| {
            format!("ghcr.io/trunkscribe/trunkscribe:main-{implementation}-{model}-cuda_{cuda_version}")
        });

        let git_commit = Self::git_commit();

        let forbidden_path = PathBuf::from(
            std::env::var("FORBIDDEN_INSTANCE_CONFIG")
                .unwrap_or_else(|_| DEFAULT_FORBIDDEN_PATH.to_string()),
        );
        let forbidden_instances = match std::fs::read_to_string(&forbidden_path) {
            Ok(raw) => serde_json::from_str::<Vec<String>>(&raw)
                .map(HashSet::from_iter)
                .unwrap_or_default(),
            Err(_) => HashSet::new(),
        };

        Ok(Self {
            options,
            vast,
            telemetry,
            broker,
            envs,
            model,
            implementation,
            image,
            git_commit,
            forbidden_path,
            forbidden_instances,
            running_instances: Vec::new(),
            pending_instances: HashMap::new(),
            message_rates: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    async fn public_hostname() -> Result<String> {
        if let Ok(base_url) = std::env::var("API_BASE_URL") {
            if let Ok(parsed) = url::Url::parse(&base_url) {
                if let Some(host) = parsed.host_str() {
                    return Ok(host.to_string());
                }
            }
        }
        let ip = reqwest::get("https://checkip.amazonaws.com")
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(ip.trim().to_string())
    }

    fn git_commit() -> String {
        if let Ok(commit) = std::env::var("GIT_COMMIT") {
            return commit.chars().take(7).collect();
        }
        std::process::Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
            .ok()
            .filter(|output| output.status.success())
            .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn cuda_major_minor(&self) -> String {
        let cuda = std::env::var("CUDA_VERSION").unwrap_or_else(|_| "12.1.0".to_string());
        let mut parts = cuda.split('.');
        match (parts.next(), parts.next()) {
            (Some(major), Some(minor)) => format!("{major}.{minor}"),
            _ => "12.1".to_string(),
        }
    }

    fn update_fleet_views(&mut self, instances: &[Instance], deleted: &HashSet<i64>) {
        self.running_instances = instances
            .iter()
            .filter(|instance| instance.is_running() && !deleted.contains(&instance.id))
            .map(Instance::hostname)
            .collect();

        self.pending_instances = instances
            .iter()
            .filter(|instance| !instance.is_running() && !deleted.contains(&instance.id))
            .filter_map(|instance| {
                let hostname = instance.env("CELERY_HOSTNAME")?;
                let concurrency: u32 = instance.env("CELERY_CONCURRENCY")?.parse().ok()?;
                Some((hostname.to_string(), concurrency))
            })
            .collect();
    }

    /// Only instances launched with this fleet's broker URL belong to us.
    async fn fleet_instances(&self) -> Result<Vec<Instance>> {
        let broker_url = self.envs.get("CELERY_BROKER_URL").cloned().unwrap_or_default();
        Ok(self
            .vast
            .list_instances()
            .await?
            .into_iter()
            .filter(|instance| instance.env("CELERY_BROKER_URL") == Some(broker_url.as_str()))
            .collect())
    }

    async fn find_available_instances(&self, vram_needed: f64) -> Result<Vec<Offer>> {
        let vram_needed = vram_needed.max(10.0 * 1024.0);
        let offer_type = if std::env::var("VAST_ONDEMAND").is_ok() {
            "ask"
        } else {
            "bid"
        };
        let query = json!({
            "rentable": {"eq": "true"},
            "num_gpus": {"eq": "1"},
            "gpu_ram": {"gte": format!("{vram_needed:.1}")},
            "cuda_max_good": {"gte": self.cuda_major_minor()},
            "order": [["dph_total", "asc"]],
            "type": offer_type,
        });

        let offers = self.vast.search_offers(&query).await?;
        Ok(offers
            .into_iter()
            .filter(|offer| {
                let hostname = offer.hostname();
                offer.gpu_name.contains("RTX")
                    && !self.running_instances.contains(&hostname)
                    && !self.forbidden_instances.contains(&hostname)
            })
            .collect())
    }

    async fn create_instances(&mut self, count: u32) -> Result<u32> {
        info!(count, "scaling up");

        let vram_required = vram_required(&self.model, &self.implementation)?;
        let mut offers: VecDeque<Offer> =
            self.find_available_instances(vram_required).await?.into();

        let mut image = self.image.clone();
        if !image.contains('@') {
            match self.vast.resolve_image_digest(&image).await {
                Ok(pinned) => image = pinned,
                Err(err) => warn!(%err, "could not pin image digest, using tag"),
            }
        }

        let on_demand = std::env::var("VAST_ONDEMAND").is_ok();
        let mut created = 0u32;
        let mut remaining = count;
        while remaining > 0 {
            let Some(offer) = offers.pop_front() else {
                break;
            };
            remaining -= 1;

            let hostname = offer.hostname();
            let concurrency = concurrency_for(offer.gpu_ram, vram_required);

            let mut envs = self.envs.clone();
            envs.insert("CELERY_CONCURRENCY".into(), concurrency.to_string());
            envs.insert(
                "CELERY_HOSTNAME".into(),
                format!("celery-{}@{hostname}", self.git_commit),
            );

            let mut body = json!({
                "client_id": "me",
                "image": image,
                "args": ["worker"],
                "env": envs,
                "disk": 16,
                "runtype": "args",
            });
            let price = if on_demand {
                offer.dph_total
            } else {
                let bid = bid_price(offer.dph_total);
                body["price"] = json!(bid);
                bid
            };

            self.vast.create_instance(offer.id, &body).await?;
            info!(
                offer = offer.id,
                gpu = %offer.gpu_name,
                concurrency,
                price_per_hour = price,
                %hostname,
                "started instance"
            );
            self.running_instances.push(hostname);
            created += 1;
        }

        Ok(created)
    }

    async fn delete_instances(
        &mut self,
        mut count: u32,
        delete_exited: bool,
        delete_errored: bool,
    ) -> Result<u32> {
        let instances = self.fleet_instances().await?;
        let online_workers = self
            .broker
            .list_consumers(TRANSCRIBE_QUEUE)
            .await?
            .join(" ");
        let now = epoch_now();

        let mut deletable: Vec<(Instance, DeletionReason)> = Vec::new();
        let mut newly_forbidden = false;
        for instance in &instances {
            if let Some((reason, forbid)) =
                classify_deletable(instance, now, &online_workers, delete_exited, delete_errored)
            {
                if forbid && self.forbidden_instances.insert(instance.hostname()) {
                    newly_forbidden = true;
                }
                deletable.push((instance.clone(), reason));
            }
        }

        if newly_forbidden {
            if let Err(err) = self.persist_forbidden() {
                warn!(%err, "failed to persist forbidden instances");
            }
        }

        if count > 0 {
            info!(count, "scaling down");
            // Most expensive first.
            let mut by_price = instances.clone();
            by_price.sort_by(|a, b| {
                b.dph_total
                    .partial_cmp(&a.dph_total)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for instance in by_price {
                if count == 0 {
                    break;
                }
                if deletable.iter().any(|(chosen, _)| chosen.id == instance.id) {
                    continue;
                }
                deletable.push((instance, DeletionReason::ReduceReplicas));
                count -= 1;
            }
        }

        let mut deleted_ids = HashSet::new();
        for (instance, reason) in &deletable {
            self.vast.destroy_instance(instance.id).await?;
            deleted_ids.insert(instance.id);
            let age_hours = instance
                .start_date
                .map(|start| (now - start) / 3600.0)
                .unwrap_or(0.0);
            info!(
                reason = reason.as_str(),
                instance = instance.id,
                gpu = instance.gpu_name.as_deref().unwrap_or("unknown"),
                price_per_hour = instance.dph_total,
                age_hours = format!("{age_hours:.2}"),
                status = instance.status_msg.as_deref().unwrap_or(""),
                "deleted instance"
            );
        }

        self.update_fleet_views(&instances, &deleted_ids);

        Ok(deletable.len() as u32)
    }

    /// Atomic write so a crash mid-save cannot clobber the list.
    fn persist_forbidden(&self) -> Result<()> {
        if let Some(parent) = self.forbidden_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut hosts: Vec<&String> = self.forbidden_instances.iter().collect();
        hosts.sort();
        let tmp_path = self.forbidden_path.with_extension("tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(&hosts)?)?;
        std::fs::rename(&tmp_path, &self.forbidden_path)?;
        Ok(())
    }

    fn average_message_rate(&self, fallback: f64) -> f64 {
        let rates = self
            .message_rates
            .lock()
            .expect("message rate mutex poisoned");
        if rates.is_empty() {
            fallback
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        }
    }

    /// One control-loop tick. Returns the net fleet change.
    async fn maybe_scale(&mut self) -> Result<i64> {
        self.delete_instances(0, true, true).await?;

        let status = self.telemetry.queue_status(TRANSCRIBE_QUEUE).await?;
        let message_rate = self.average_message_rate(status.message_rate());
        info!(
            message_rate = format!("{message_rate:.2}"),
            messages = status.messages,
            consumers = status.consumers,
            "queue telemetry"
        );

        let needed = calculate_needed_instances(&status, message_rate);
        let current = status.consumers as i64 + self.pending_instances.len() as i64;
        let target = needed.clamp(self.options.min as i64, self.options.max as i64);

        if target > current {
            let created = self.create_instances((target - current) as u32).await?;
            return Ok(created as i64);
        }
        if target < current {
            let deleted = self
                .delete_instances((current - target) as u32, false, false)
                .await?;
            return Ok(-(deleted as i64));
        }
        Ok(0)
    }

    /// Telemetry poller: one sample every two seconds, windowed to half the
    /// control interval.
    fn spawn_monitor(&self) -> tokio::task::JoinHandle<()> {
        let telemetry = self.telemetry.clone();
        let rates = self.message_rates.clone();
        let window = (self.options.interval_secs / 2).max(1) as usize;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(2));
            loop {
                ticker.tick().await;
                match telemetry.queue_status(TRANSCRIBE_QUEUE).await {
                    Ok(status) => {
                        let mut rates = rates.lock().expect("message rate mutex poisoned");
                        rates.push_back(status.message_rate());
                        while rates.len() > window {
                            rates.pop_front();
                        }
                    }
                    Err(err) => warn!(%err, "queue telemetry poll failed"),
                }
            }
        })
    }

    pub async fn run(mut self) {
        info!(
            min = self.options.min,
            max = self.options.max,
            interval = self.options.interval_secs,
            image = %self.image,
            "autoscaler started"
        );

        let _monitor = self.spawn_monitor();
        let interval = Duration::from_secs(self.options.interval_secs);

        loop {
            let started = Instant::now();
            match self.maybe_scale().await {
                Ok(change) => info!(change, "scale pass complete"),
                Err(err) => error!(%err, "scale pass failed"),
            }
            let elapsed = started.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
    }
}

fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(consumers: u64, messages: u64, rate: f64, ack_rate: f64) -> QueueStatus {
        serde_json::from_value(json!({
            "consumers": consumers,
            "messages": messages,
            "messages_details": {"rate": rate},
            "message_stats": {"ack_details": {"rate": ack_rate}},
        }))
        .unwrap()
    }

    #[test]
    fn scales_up_on_ingress_pressure() {
        let queue = status(2, 50, 0.5, 4.0);
        assert_eq!(calculate_needed_instances(&queue, 0.5), 3);
    }

    #[test]
    fn scales_up_when_no_consumers() {
        let queue = status(0, 0, 0.0, 0.0);
        assert_eq!(calculate_needed_instances(&queue, 0.0), 1);
    }

    #[test]
    fn scales_up_on_slow_drain() {
        // depth 500, one consumer acking ~1.67/s -> ~300s to clear.
        let queue = status(1, 500, 0.0, 1.67);
        assert_eq!(calculate_needed_instances(&queue, 0.0), 2);
    }

    #[test]
    fn holds_on_fast_drain() {
        // depth 500, acking 10/s per consumer -> 50s to clear.
        let queue = status(1, 500, 0.0, 10.0);
        assert_eq!(calculate_needed_instances(&queue, 0.0), 1);
    }

    #[test]
    fn deep_queue_with_zero_ack_rate_scales_up() {
        let queue = status(1, 500, 0.0, 0.0);
        assert_eq!(calculate_needed_instances(&queue, 0.0), 2);
    }

    #[test]
    fn scales_down_when_draining_and_empty() {
        let queue = status(3, 5, -0.6, 2.0);
        assert_eq!(calculate_needed_instances(&queue, -0.6), 2);
    }

    #[test]
    fn holds_otherwise() {
        let queue = status(2, 100, 0.1, 2.0);
        assert_eq!(calculate_needed_instances(&queue, 0.1), 2);
    }

    #[test]
    fn vram_floor_honors_quantized_implementations() {
        assert!((vram_required("large-v3", "whisper-rs").unwrap() - 4915.2).abs() < 1e-6);
        assert_eq!(vram_required("large-v3", "openai").unwrap(), 12_288.0);
        assert!(matches!(
            vram_required("huge-v9", "whisper-rs"),
            Err(ScalerError::UnknownModel(_))
        ));
    }

    #[test]
    fn concurrency_floors_and_clamps() {
        assert_eq!(concurrency_for(24_576.0, 4096.0), 6);
        assert_eq!(concurrency_for(10_000.0, 4915.2), 2);
        assert_eq!(concurrency_for(4_000.0, 4915.2), 1);
    }

    #[test]
    fn bid_is_markup_with_floor() {
        assert_eq!(bid_price(0.2), 0.25);
        assert_eq!(bid_price(0.0), 0.001);
        assert_eq!(bid_price(0.123456), 0.15432);
    }

    fn instance(raw: serde_json::Value) -> Instance {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn stuck_loading_is_flagged_and_forbidden() {
        let stuck = instance(json!({
            "id": 1, "machine_id": 1, "host_id": 2,
            "actual_status": "loading",
            "start_date": 0.0,
        }));
        let classified = classify_deletable(&stuck, 2000.0, "", true, true);
        assert_eq!(classified, Some((DeletionReason::StuckLoading, true)));
    }

    #[test]
    fn disconnected_running_instance_is_flagged() {
        let ghost = instance(json!({
            "id": 1, "machine_id": 1, "host_id": 2,
            "actual_status": "running",
            "start_date": 0.0,
        }));
        let classified = classify_deletable(&ghost, 2000.0, "celery-abc@9.9.vast.ai", true, true);
        assert_eq!(classified, Some((DeletionReason::Disconnected, false)));

        let seen = classify_deletable(&ghost, 2000.0, "celery-abc@1.2.vast.ai", true, true);
        assert_eq!(seen, None);
    }

    #[test]
    fn exited_and_stopped_are_cleaned_without_forbidding() {
        let exited = instance(json!({
            "id": 1, "machine_id": 1, "host_id": 2,
            "actual_status": "exited",
            "start_date": 0.0,
        }));
        assert_eq!(
            classify_deletable(&exited, 100.0, "", true, true),
            Some((DeletionReason::Exited, false))
        );
        assert_eq!(classify_deletable(&exited, 100.0, "", false, true), None);

        let stopped = instance(json!({
            "id": 2, "machine_id": 1, "host_id": 2,
            "actual_status": "created",
            "cur_state": "stopped",
            "start_date": 0.0,
        }));
        assert_eq!(
            classify_deletable(&stopped, 100.0, "", true, true),
            Some((DeletionReason::Exited, false))
        );
    }

    #[test]
    fn errored_status_message_is_forbidden() {
        let errored = instance(json!({
            "id": 1, "machine_id": 1, "host_id": 2,
            "actual_status": "running",
            "status_msg": "CUDA Error: out of memory",
            "start_date": 0.0,
        }));
        let classified = classify_deletable(&errored, 100.0, &errored.hostname(), true, true);
        assert_eq!(classified, Some((DeletionReason::Error, true)));
    }

    #[test]
    fn full_disk_wins_over_other_reasons() {
        let full = instance(json!({
            "id": 1, "machine_id": 1, "host_id": 2,
            "actual_status": "exited",
            "disk_usage": 15.0, "disk_space": 16.0,
            "start_date": 0.0,
        }));
        assert_eq!(
            classify_deletable(&full, 100.0, "", true, true),
            Some((DeletionReason::DiskSpaceFull, false))
        );
    }

    #[test]
    fn healthy_running_instance_is_kept() {
        let healthy = instance(json!({
            "id": 1, "machine_id": 1, "host_id": 2,
            "actual_status": "running",
            "status_msg": "success",
            "start_date": 0.0,
        }));
        assert_eq!(
            classify_deletable(&healthy, 100.0, &healthy.hostname(), true, true),
            None
        );
    }
}
