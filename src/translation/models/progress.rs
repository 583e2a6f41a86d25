//! 下载进度跟踪
//!
//! 每次下载一个跟踪器，保证监听器看到的进度单调不减，
//! 且在成功回调之前一定收到过一次 100。
//! 跟踪器自带互斥锁，不同模型的进度回调互不阻塞。

use std::sync::{Arc, Mutex, MutexGuard};

/// 下载监听器
pub trait DownloadListener: Send + Sync {
    fn on_progress(&self, progress: u8);

    fn on_success(&self);

    fn on_error(&self, error: String);
}

#[derive(Debug, Default)]
struct TrackerState {
    last: Option<u8>,
    closed: bool,
}

type ProgressHook = Box<dyn Fn(u8) + Send + Sync>;

/// 单次下载的进度跟踪器
pub struct ProgressTracker {
    listener: Arc<dyn DownloadListener>,
    hook: ProgressHook,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    /// # 参数
    ///
    /// * `listener` - 接收进度、成功与失败通知
    /// * `hook` - 每个被接受的进度值先交给它（用于更新模型表）
    pub fn new(listener: Arc<dyn DownloadListener>, hook: ProgressHook) -> Self {
        Self {
            listener,
            hook,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 上报进度
    ///
    /// 超过 100 的值按 100 处理；回退或重复的值被丢弃；关闭后忽略。
    pub fn report(&self, progress: u32) {
        let mut state = self.lock();
        self.emit(&mut state, progress.min(100) as u8);
    }

    fn emit(&self, state: &mut TrackerState, value: u8) {
        if state.closed {
            return;
        }
        if let Some(last) = state.last {
            if value <= last {
                if value < last {
                    tracing::trace!("忽略回退的进度: {} < {}", value, last);
                }
                return;
            }
        }
        state.last = Some(value);
        (self.hook)(value);
        self.listener.on_progress(value);
    }

    /// 最近一次送达监听器的进度
    pub fn last_reported(&self) -> Option<u8> {
        self.lock().last
    }

    /// 补齐 100 并关闭，之后的上报全部忽略
    pub fn finish(&self) {
        let mut state = self.lock();
        if state.last != Some(100) {
            self.emit(&mut state, 100);
        }
        state.closed = true;
    }

    /// 关闭但不补齐进度（失败路径）
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn listener(&self) -> &Arc<dyn DownloadListener> {
        &self.listener
    }
}

/// 交给模型获取实现的进度上报句柄
#[derive(Clone)]
pub struct ProgressSink {
    tracker: Arc<ProgressTracker>,
}

impl ProgressSink {
    pub fn new(tracker: Arc<ProgressTracker>) -> Self {
        Self { tracker }
    }

    /// 上报百分比
    pub fn report(&self, percent: u32) {
        self.tracker.report(percent);
    }

    /// 按字节数上报
    pub fn report_bytes(&self, downloaded: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = downloaded.saturating_mul(100) / total;
        self.tracker.report(percent.min(100) as u32);
    }
}
