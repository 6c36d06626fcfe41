//! 准入控制器 - 基础设施层
//!
//! 每个服务商一个实例，限制三件事：
//! - 每分钟请求数
//! - 每分钟 token 数
//! - 同时在途的请求数
//!
//! 被拒绝的调用方可以把操作放进 FIFO 等待队列，
//! 队列只受并发上限约束，不受每分钟预算约束。

use crate::error::RateLimitError;
use serde::Deserialize;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// 预算窗口长度
pub const BUDGET_WINDOW: Duration = Duration::from_secs(60);

/// 限流参数
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests_per_minute: u32,
    pub max_tokens_per_minute: u64,
    pub max_concurrent_requests: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 20,
            max_tokens_per_minute: 100_000,
            max_concurrent_requests: 3,
        }
    }
}

type QueuedJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct LimiterState {
    request_count: u32,
    token_count: u64,
    window_start: Instant,
    active_requests: usize,
    queue: VecDeque<QueuedJob>,
}

/// 计数器快照（只用于观测）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    pub request_count: u32,
    pub token_count: u64,
    pub active_requests: usize,
    pub queued: usize,
}

/// 准入控制器
///
/// 克隆后共享同一份计数器。所有"检查并递增"都在同一把锁内完成，
/// 锁不会跨越 `.await`。
#[derive(Clone)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    state: Arc<Mutex<LimiterState>>,
}

impl RateLimiter {
    /// 创建新的准入控制器
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            state: Arc::new(Mutex::new(LimiterState {
                request_count: 0,
                token_count: 0,
                window_start: Instant::now(),
                active_requests: 0,
                queue: VecDeque::new(),
            })),
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// 尝试获取许可
    ///
    /// # 参数
    /// - `estimated_tokens`: 本次请求预估的 token 数
    ///
    /// # 返回
    /// 获得许可返回 true（三个计数器同时递增），否则返回 false 且不修改任何状态
    pub fn acquire_permit(&self, estimated_tokens: u64) -> bool {
        self.acquire_permit_at(estimated_tokens, Instant::now())
    }

    /// 以指定时间点判断窗口是否过期的 `acquire_permit`
    pub fn acquire_permit_at(&self, estimated_tokens: u64, now: Instant) -> bool {
        let mut state = self.lock();

        if now.duration_since(state.window_start) >= BUDGET_WINDOW {
            state.request_count = 0;
            state.token_count = 0;
            state.window_start = now;
        }

        if state.request_count >= self.settings.max_requests_per_minute {
            debug!(
                "请求数已达上限: {}/{}",
                state.request_count, self.settings.max_requests_per_minute
            );
            return false;
        }
        if state.token_count.saturating_add(estimated_tokens) >= self.settings.max_tokens_per_minute
        {
            debug!(
                "token 预算不足: 已用 {}，本次 {}，上限 {}",
                state.token_count, estimated_tokens, self.settings.max_tokens_per_minute
            );
            return false;
        }
        if state.active_requests >= self.settings.max_concurrent_requests {
            debug!(
                "并发已满: {}/{}",
                state.active_requests, self.settings.max_concurrent_requests
            );
            return false;
        }

        state.request_count += 1;
        state.token_count += estimated_tokens;
        state.active_requests += 1;
        true
    }

    /// 获取许可的 RAII 形式，许可在 `Permit` 被 drop 时归还
    pub fn try_acquire(&self, estimated_tokens: u64) -> Option<Permit> {
        self.acquire_permit(estimated_tokens).then(|| Permit {
            limiter: self.clone(),
            tokens_reserved: estimated_tokens,
        })
    }

    /// 归还许可
    ///
    /// 只减少在途请求数，窗口内已计入的请求数与 token 数保持不变，
    /// 随后尝试启动排队中的操作。
    pub fn release_permit(&self, _estimated_tokens: u64) {
        self.release_slot();
    }

    /// 把操作放入等待队列
    ///
    /// 返回的 future 以操作自身的结果完成；
    /// 若操作在启动前被 `clear_queue` 丢弃，则返回 `RateLimitError::QueueDropped`。
    ///
    /// 排队的操作只在 tokio 运行时内启动：在运行时外入队时操作留在队列中，
    /// 直到运行时内有许可归还。
    pub fn enqueue<T, F, Fut>(&self, operation: F) -> impl Future<Output = Result<T, RateLimitError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: QueuedJob = Box::pin(async move {
            let output = operation().await;
            let _ = tx.send(output);
        });

        let handle = self.runtime_handle();
        let (queued, ready) = {
            let mut state = self.lock();
            state.queue.push_back(job);
            let queued = state.queue.len();
            (queued, self.take_ready(&mut state, handle.is_some()))
        };
        debug!("操作已入队，当前队列长度: {}", queued);

        self.spawn_ready(handle, ready);

        async move { rx.await.map_err(|_| RateLimitError::QueueDropped) }
    }

    /// 排队中的操作数量
    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// 在途请求数
    pub fn active_requests(&self) -> usize {
        self.lock().active_requests
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        let state = self.lock();
        LimiterSnapshot {
            request_count: state.request_count,
            token_count: state.token_count,
            active_requests: state.active_requests,
            queued: state.queue.len(),
        }
    }

    /// 丢弃所有尚未启动的排队操作，返回丢弃数量
    pub fn clear_queue(&self) -> usize {
        let dropped: Vec<QueuedJob> = self.lock().queue.drain(..).collect();
        if !dropped.is_empty() {
            debug!("已清空等待队列: {} 个操作", dropped.len());
        }
        dropped.len()
    }

    /// 归还一个并发槽位，并在同一把锁内把空出的槽位交给队首操作
    fn release_slot(&self) {
        let handle = self.runtime_handle();
        let ready = {
            let mut state = self.lock();
            state.active_requests = state.active_requests.saturating_sub(1);
            self.take_ready(&mut state, handle.is_some())
        };
        self.spawn_ready(handle, ready);
    }

    /// 在并发上限内弹出队首操作，并为每个操作占用一个槽位
    fn take_ready(&self, state: &mut LimiterState, can_spawn: bool) -> Vec<QueuedJob> {
        let mut ready = Vec::new();
        if !can_spawn {
            return ready;
        }
        while state.active_requests < self.settings.max_concurrent_requests {
            match state.queue.pop_front() {
                Some(job) => {
                    state.active_requests += 1;
                    ready.push(job);
                }
                None => break,
            }
        }
        ready
    }

    /// 在锁外启动已占用槽位的操作
    fn spawn_ready(&self, handle: Option<Handle>, ready: Vec<QueuedJob>) {
        let Some(handle) = handle else {
            let queued = self.queue_len();
            if queued > 0 {
                warn!("当前不在 tokio 运行时内，{} 个排队操作暂不启动", queued);
            }
            return;
        };
        for job in ready {
            let slot = QueueSlot {
                limiter: self.clone(),
            };
            handle.spawn(async move {
                let _slot = slot;
                job.await;
            });
        }
    }

    fn runtime_handle(&self) -> Option<Handle> {
        Handle::try_current().ok()
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 已获得的许可，drop 时归还（成功、失败、取消都只归还一次）
pub struct Permit {
    limiter: RateLimiter,
    tokens_reserved: u64,
}

impl Permit {
    pub fn tokens_reserved(&self) -> u64 {
        self.tokens_reserved
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.limiter.release_permit(self.tokens_reserved);
    }
}

/// 排队操作占用的并发槽位，任务结束（包括 panic）时释放
struct QueueSlot {
    limiter: RateLimiter,
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.limiter.release_slot();
    }
}
