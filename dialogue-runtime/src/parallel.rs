//! # Parallel 模块
//!
//! 并行等待组合器：一次启动 N 个可取消的子任务，全部完成后触发一次完成信号。
//!
//! ## 状态
//!
//! ```text
//! waiting   completed < N 且未被强制完成
//! complete  completed == N（自然完成）或 forced（强制完成）
//! ```
//!
//! - 每个任务通过独占的 [`Completion`] 回报一次，`complete(self)` 消耗自身
//! - `force_complete()` 幂等：取消仍在运行的任务，计数直接置为 N，之后的回报全部忽略
//! - 完成信号由单一的 `resolved` 标记守护，自然完成与强制完成谁先到都只触发一次
//! - N = 0 时在构造期间同步触发
//! - `None` 任务在构造时即视为已完成，不会被启动
//! - [`ParallelWait`] 本身也是 [`WaitTask`]，取消会递归传播到内层

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::debug;

/// 可取消的异步子任务
///
/// 在单线程协作模型下，"异步"意味着任务在稍后的某个时刻通过 [`Completion`] 回报。
pub trait WaitTask {
    /// 启动任务
    ///
    /// 任务可以同步调用 `done.complete()`，也可以保存 `done` 稍后调用。
    fn start(&mut self, done: Completion);

    /// 尽力取消任务
    ///
    /// 只会对尚未回报完成的任务调用，不保证任务立即停止。
    fn cancel(&mut self);
}

type Listener = Box<dyn FnOnce()>;

struct WaitState {
    total: usize,
    completed: usize,
    finished: Vec<bool>,
    forced: bool,
    resolved: bool,
    tasks: Vec<Option<Box<dyn WaitTask>>>,
    listeners: Vec<Listener>,
}

/// 子任务的完成回报凭证
///
/// 只持有弱引用，等待句柄释放后回报会被静默忽略。
pub struct Completion {
    state: Weak<RefCell<WaitState>>,
    index: usize,
}

impl Completion {
    /// 回报完成
    pub fn complete(self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        {
            let mut s = state.borrow_mut();
            if s.forced || s.finished[self.index] {
                return;
            }
            s.finished[self.index] = true;
            s.completed += 1;
        }
        resolve_if_done(&state);
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("index", &self.index)
            .finish()
    }
}

fn resolve_if_done(state: &Rc<RefCell<WaitState>>) {
    let listeners = {
        let mut s = state.borrow_mut();
        if s.resolved || s.completed < s.total {
            return;
        }
        s.resolved = true;
        debug!(total = s.total, "并行等待自然完成");
        std::mem::take(&mut s.listeners)
    };
    for listener in listeners {
        listener();
    }
}

/// 并行等待句柄
pub struct ParallelWait {
    state: Rc<RefCell<WaitState>>,
}

impl ParallelWait {
    /// 启动一组任务
    pub fn new(tasks: Vec<Option<Box<dyn WaitTask>>>) -> Self {
        Self::build(tasks, Vec::new())
    }

    /// 启动一组任务，并在完成时调用 `on_complete`（恰好一次）
    pub fn with_callback(
        tasks: Vec<Option<Box<dyn WaitTask>>>,
        on_complete: impl FnOnce() + 'static,
    ) -> Self {
        Self::build(tasks, vec![Box::new(on_complete)])
    }

    fn build(tasks: Vec<Option<Box<dyn WaitTask>>>, listeners: Vec<Listener>) -> Self {
        let total = tasks.len();
        let finished: Vec<bool> = tasks.iter().map(Option::is_none).collect();
        let completed = finished.iter().filter(|done| **done).count();

        let handle = Self {
            state: Rc::new(RefCell::new(WaitState {
                total,
                completed,
                finished,
                forced: false,
                resolved: false,
                tasks: (0..total).map(|_| None).collect(),
                listeners,
            })),
        };

        for (index, task) in tasks.into_iter().enumerate() {
            let Some(mut task) = task else {
                continue;
            };
            // 启动过程中被强制完成，剩余任务不再启动
            if handle.state.borrow().forced {
                break;
            }
            task.start(Completion {
                state: Rc::downgrade(&handle.state),
                index,
            });
            handle.state.borrow_mut().tasks[index] = Some(task);
        }

        resolve_if_done(&handle.state);
        handle
    }

    /// 已完成的任务数
    pub fn completed_count(&self) -> usize {
        self.state.borrow().completed
    }

    /// 任务总数
    pub fn total(&self) -> usize {
        self.state.borrow().total
    }

    /// 是否已完成（自然或强制）
    pub fn is_complete(&self) -> bool {
        self.state.borrow().resolved
    }

    /// 是否仍在等待
    pub fn is_waiting(&self) -> bool {
        !self.is_complete()
    }

    /// 是否被强制完成
    pub fn is_forced(&self) -> bool {
        self.state.borrow().forced
    }

    /// 注册完成监听
    ///
    /// 已完成时立即调用。
    pub fn on_complete(&self, listener: impl FnOnce() + 'static) {
        {
            let mut s = self.state.borrow_mut();
            if !s.resolved {
                s.listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    /// 强制完成
    ///
    /// 幂等；已经完成（自然或强制）时为空操作。
    pub fn force_complete(&self) {
        let (running, listeners) = {
            let mut s = self.state.borrow_mut();
            if s.forced || s.resolved {
                return;
            }
            s.forced = true;
            s.resolved = true;
            s.completed = s.total;

            let s = &mut *s;
            let running: Vec<Box<dyn WaitTask>> = s
                .tasks
                .iter_mut()
                .zip(s.finished.iter())
                .filter(|(_, done)| !**done)
                .filter_map(|(task, _)| task.take())
                .collect();
            debug!(
                total = s.total,
                cancelled = running.len(),
                "并行等待被强制完成"
            );
            (running, std::mem::take(&mut s.listeners))
        };

        for mut task in running {
            task.cancel();
        }
        for listener in listeners {
            listener();
        }
    }
}

impl std::fmt::Debug for ParallelWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("ParallelWait")
            .field("total", &s.total)
            .field("completed", &s.completed)
            .field("forced", &s.forced)
            .field("resolved", &s.resolved)
            .finish()
    }
}

/// 嵌套使用：内层完成时回报外层，外层取消时强制完成内层
impl WaitTask for ParallelWait {
    fn start(&mut self, done: Completion) {
        self.on_complete(move || done.complete());
    }

    fn cancel(&mut self) {
        self.force_complete();
    }
}
