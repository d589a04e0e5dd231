//! Run-on-loop primitive shared by the presentation thread and its workers.
//! 呈現執行緒與背景工作者之間唯一的跨執行緒通道。
//!
//! Workers never touch presentation state directly. They hand a callback to
//! a [`LoopProxy`]; the presentation thread runs queued callbacks, in the
//! order they were enqueued, the next time it drains its [`LoopQueue`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use tracing::{trace, warn};

/// A unit of work scheduled onto the presentation loop.
pub type LoopCallback<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// 呈現迴圈端的佇列。 / Receiving side owned by the presentation loop.
pub struct LoopQueue<S> {
    sender: Sender<LoopCallback<S>>,
    receiver: Receiver<LoopCallback<S>>,
}

impl<S> Default for LoopQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> LoopQueue<S> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// 取得可交給工作者的排程控制代碼。 / Returns a handle workers use to schedule callbacks.
    pub fn proxy(&self) -> LoopProxy<S> {
        LoopProxy {
            sender: self.sender.clone(),
        }
    }

    /// 依序執行所有已排入的回呼。 / Runs every queued callback in FIFO order; returns how many ran.
    pub fn drain(&self, state: &mut S) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(callback) => {
                    callback(state);
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if ran > 0 {
            trace!(ran, "drained loop callbacks");
        }
        ran
    }

    /// 最多等待 `timeout` 取得第一個回呼，再清空佇列。 / Waits up to `timeout` for the first callback, then drains the rest.
    pub fn wait_and_drain(&self, state: &mut S, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(callback) => {
                callback(state);
                1 + self.drain(state)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }
}

/// 可跨執行緒複製的排程代理。 / Cloneable, thread-safe scheduling handle.
pub struct LoopProxy<S> {
    sender: Sender<LoopCallback<S>>,
}

impl<S> Clone for LoopProxy<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<S> LoopProxy<S> {
    /// Enqueues `callback` for the next loop iteration. Fire-and-forget: if
    /// the loop is gone the callback is dropped and `false` is returned.
    pub fn call_soon<F>(&self, callback: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        match self.sender.send(Box::new(callback)) {
            Ok(()) => true,
            Err(_) => {
                warn!("presentation loop is gone; dropping scheduled callback");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn callbacks_run_only_when_drained() {
        let queue: LoopQueue<Vec<u32>> = LoopQueue::new();
        let proxy = queue.proxy();
        assert!(proxy.call_soon(|state| state.push(1)));
        assert!(proxy.call_soon(|state| state.push(2)));

        let mut state = Vec::new();
        assert!(state.is_empty());
        assert_eq!(queue.drain(&mut state), 2);
        assert_eq!(state, [1, 2]);
        assert_eq!(queue.drain(&mut state), 0);
    }

    #[test]
    fn delivery_follows_completion_order() {
        let queue: LoopQueue<Vec<&'static str>> = LoopQueue::new();
        let gate = Arc::new(Barrier::new(2));

        let slow = {
            let proxy = queue.proxy();
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.wait();
                proxy.call_soon(|state| state.push("started first"));
            })
        };
        let fast = {
            let proxy = queue.proxy();
            thread::spawn(move || {
                proxy.call_soon(|state| state.push("started second"));
            })
        };
        fast.join().unwrap();
        gate.wait();
        slow.join().unwrap();

        let mut state = Vec::new();
        queue.drain(&mut state);
        assert_eq!(state, ["started second", "started first"]);
    }

    #[test]
    fn wait_and_drain_times_out_when_idle() {
        let queue: LoopQueue<u32> = LoopQueue::new();
        let mut state = 0;
        assert_eq!(queue.wait_and_drain(&mut state, Duration::from_millis(5)), 0);

        let proxy = queue.proxy();
        thread::spawn(move || {
            proxy.call_soon(|state| *state += 7);
        });
        assert_eq!(queue.wait_and_drain(&mut state, Duration::from_secs(5)), 1);
        assert_eq!(state, 7);
    }

    #[test]
    fn proxy_reports_dropped_loop() {
        let queue: LoopQueue<u32> = LoopQueue::new();
        let proxy = queue.proxy();
        drop(queue);
        assert!(!proxy.call_soon(|state| *state += 1));
    }
}
