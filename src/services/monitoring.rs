//! 指标与告警 - 业务能力层
//!
//! 按服务商记录延迟、token 用量和错误样本，错误或延迟超过阈值时发出告警。
//! 所有告警共用一个冷却时间：冷却期内任何来源的告警都会被抑制。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// `average_latency` 的默认统计区间
pub const DEFAULT_LATENCY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// 监控参数
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorSettings {
    /// 同一 (服务商, 错误类型) 累计多少次触发告警
    pub error_threshold: u32,
    pub alert_cooldown_secs: u64,
    pub latency_threshold_ms: u64,
    pub retention_hours: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            alert_cooldown_secs: 5 * 60,
            latency_threshold_ms: 45_000,
            retention_hours: 24,
            cleanup_interval_secs: 60 * 60,
        }
    }
}

impl MonitorSettings {
    fn alert_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.alert_cooldown_secs as i64)
    }

    fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }
}

/// 指标类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Latency,
    Tokens,
    Errors,
}

impl MetricKind {
    fn suffix(self) -> &'static str {
        match self {
            MetricKind::Latency => "latency",
            MetricKind::Tokens => "tokens",
            MetricKind::Errors => "errors",
        }
    }
}

/// 单个样本
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// 已发出的告警
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Default)]
struct MonitorState {
    metrics: HashMap<String, Vec<MetricPoint>>,
    error_counts: HashMap<String, u32>,
    last_alert: Option<DateTime<Utc>>,
    alerts: Vec<Alert>,
}

/// 模型调用监控
pub struct AiMonitor {
    settings: MonitorSettings,
    state: Mutex<MonitorState>,
}

impl AiMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    // ========== 记录 ==========

    /// 记录一次调用的总耗时，超过阈值时尝试告警
    pub fn record_latency(&self, provider: &str, elapsed: Duration) -> Option<Alert> {
        self.record_latency_at(provider, elapsed, Utc::now())
    }

    pub fn record_latency_at(
        &self,
        provider: &str,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let ms = elapsed.as_millis() as u64;
        self.push(provider, MetricKind::Latency, ms as f64, now);

        if ms > self.settings.latency_threshold_ms {
            return self.check_and_alert_at(
                "High Latency Detected",
                &format!("{} latency is {}ms", provider, ms),
                now,
            );
        }
        None
    }

    pub fn record_token_usage(&self, provider: &str, tokens: u64) {
        self.record_token_usage_at(provider, tokens, Utc::now());
    }

    pub fn record_token_usage_at(&self, provider: &str, tokens: u64, now: DateTime<Utc>) {
        self.push(provider, MetricKind::Tokens, tokens as f64, now);
    }

    /// 记录一次错误
    ///
    /// # 参数
    /// - `provider`: 服务商名称
    /// - `code`: 错误类型代码（如 `service_unavailable`）
    ///
    /// # 返回
    /// 本次记录触发并实际发出的告警
    pub fn record_error(&self, provider: &str, code: &str) -> Option<Alert> {
        self.record_error_at(provider, code, Utc::now())
    }

    pub fn record_error_at(&self, provider: &str, code: &str, now: DateTime<Utc>) -> Option<Alert> {
        self.push(provider, MetricKind::Errors, 1.0, now);

        let count = {
            let mut state = self.lock();
            let counter = state
                .error_counts
                .entry(format!("{}_{}", provider, code))
                .or_insert(0);
            *counter += 1;
            let count = *counter;
            if count >= self.settings.error_threshold {
                *counter = 0;
            }
            count
        };

        if count >= self.settings.error_threshold {
            return self.check_and_alert_at(
                "High Error Rate",
                &format!("{} has encountered {} {} errors", provider, count, code),
                now,
            );
        }
        None
    }

    /// 冷却期外发出告警，冷却期内丢弃
    pub fn check_and_alert_at(&self, title: &str, message: &str, now: DateTime<Utc>) -> Option<Alert> {
        let mut state = self.lock();

        if let Some(last) = state.last_alert {
            if now - last < self.settings.alert_cooldown() {
                debug!("告警冷却中，忽略: {} - {}", title, message);
                return None;
            }
        }

        let alert = Alert {
            title: title.to_string(),
            message: message.to_string(),
            raised_at: now,
        };
        state.last_alert = Some(now);
        state.alerts.push(alert.clone());
        drop(state);

        warn!(title = %alert.title, "🚨 {}", alert.message);
        Some(alert)
    }

    // ========== 查询 ==========

    /// 指定区间内的样本（按时间先后）
    pub fn get_metrics(&self, provider: &str, kind: MetricKind, range: Duration) -> Vec<MetricPoint> {
        self.get_metrics_at(provider, kind, range, Utc::now())
    }

    pub fn get_metrics_at(
        &self,
        provider: &str,
        kind: MetricKind,
        range: Duration,
        now: DateTime<Utc>,
    ) -> Vec<MetricPoint> {
        let since = now - chrono::Duration::milliseconds(range.as_millis() as i64);
        self.lock()
            .metrics
            .get(&metric_key(provider, kind))
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= since)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 区间内的平均延迟（毫秒），没有样本时为 None
    pub fn average_latency(&self, provider: &str, range: Duration) -> Option<f64> {
        self.average_latency_at(provider, range, Utc::now())
    }

    pub fn average_latency_at(
        &self,
        provider: &str,
        range: Duration,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let points = self.get_metrics_at(provider, MetricKind::Latency, range, now);
        if points.is_empty() {
            return None;
        }
        Some(points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64)
    }

    /// 告警历史
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().alerts.clone()
    }

    // ========== 清理 ==========

    /// 删除超过保留期的样本，并清空错误计数
    pub fn cleanup_old_metrics(&self) {
        self.cleanup_old_metrics_at(Utc::now());
    }

    pub fn cleanup_old_metrics_at(&self, now: DateTime<Utc>) {
        let cutoff = now - self.settings.retention();
        let mut state = self.lock();

        let mut removed = 0usize;
        for points in state.metrics.values_mut() {
            let before = points.len();
            points.retain(|p| p.timestamp > cutoff);
            removed += before - points.len();
        }
        state.metrics.retain(|_, points| !points.is_empty());
        state.error_counts.clear();

        debug!("指标清理完成，移除 {} 个过期样本", removed);
    }

    /// 在当前 tokio 运行时上启动定时清理任务
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let period = Duration::from_secs(monitor.settings.cleanup_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor.cleanup_old_metrics();
            }
        })
    }

    fn push(&self, provider: &str, kind: MetricKind, value: f64, timestamp: DateTime<Utc>) {
        self.lock()
            .metrics
            .entry(metric_key(provider, kind))
            .or_default()
            .push(MetricPoint { timestamp, value });
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for AiMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::default())
    }
}

fn metric_key(provider: &str, kind: MetricKind) -> String {
    format!("{}_{}", provider, kind.suffix())
}

/// 输出某个服务商的监控摘要
pub fn log_summary(monitor: &AiMonitor, provider: &str) {
    match monitor.average_latency(provider, DEFAULT_LATENCY_WINDOW) {
        Some(avg) => info!("⏱️ {} 近 5 分钟平均延迟: {:.0}ms", provider, avg),
        None => info!("⏱️ {} 近 5 分钟没有延迟样本", provider),
    }
    info!("🚨 告警次数: {}", monitor.alerts().len());
}
