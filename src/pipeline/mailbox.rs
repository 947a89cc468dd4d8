// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 单槽邮箱: 生产者覆盖写入, 消费者取走最新的一帧
//!
//! 锁只在交换时持有 (O(1)), 不会跨越推理。

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// 取出的邮件
#[derive(Debug, PartialEq)]
pub enum Mail<T> {
    Item(T),
    /// 停止哨兵
    Stop,
}

#[derive(Debug)]
struct Slot<T> {
    item: Option<T>,
    stop: bool,
}

#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    wake: Condvar,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                item: None,
                stop: false,
            }),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 放入最新的一项, 从不阻塞; 返回 true 表示有一项被丢弃
    /// (覆盖了未处理的旧项, 或已收到停止哨兵而丢弃新项)
    pub fn post(&self, item: T) -> bool {
        let mut slot = self.lock();
        if slot.stop {
            return true;
        }
        let dropped = slot.item.replace(item).is_some();
        drop(slot);
        self.wake.notify_one();
        dropped
    }

    /// 注入停止哨兵, 未处理的项一并丢弃
    pub fn close(&self) {
        let mut slot = self.lock();
        slot.stop = true;
        slot.item = None;
        drop(slot);
        self.wake.notify_all();
    }

    /// 阻塞等待, 取走并清空槽位; 哨兵优先
    pub fn take(&self) -> Mail<T> {
        let mut slot = self.lock();
        loop {
            if slot.stop {
                return Mail::Stop;
            }
            if let Some(item) = slot.item.take() {
                return Mail::Item(item);
            }
            slot = self.wake.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 清空槽位与哨兵, 供下一次运行使用
    pub fn reset(&self) {
        let mut slot = self.lock();
        slot.item = None;
        slot.stop = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().stop
    }
}
