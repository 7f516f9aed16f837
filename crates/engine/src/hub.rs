//! 브로드캐스트 허브 -- 관찰자별 유한 outbox로의 fan-out
//!
//! 각 관찰자는 자신만의 outbox(`VecDeque`)를 가집니다. [`BroadcastHub::publish`]는
//! 모든 outbox에 메시지를 넣고 즉시 반환하며, 가득 찬 outbox는 설정된 [`DropPolicy`]에 따라
//! 해당 관찰자의 메시지 하나만 버립니다. 느린 관찰자가 생산자나 다른 관찰자를 막지 않습니다.
//!
//! 관찰자 방향 메시지는 [`HubMessage`], 관찰자가 보내는 제어 명령은 [`ControlCommand`]입니다.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;

use packetward_core::metrics as m;
use packetward_core::types::ClassifiedEvent;

use crate::config::DropPolicy;
use crate::error::EngineError;
use crate::stats::StatsSnapshot;

// =============================================================================
// 메시지
// =============================================================================

/// 캡처 상태 전이 알림의 상태 값
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Started,
    Stopped,
}

/// 관찰자에게 전달되는 메시지
///
/// JSON 직렬화 시 `type` 필드로 종류를 구분합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    /// 캡처 상태 전이
    CaptureStatus {
        status: CaptureStatus,
        stats: StatsSnapshot,
    },
    /// 새로 분류된 이벤트
    NewLog {
        log: ClassifiedEvent,
        stats: StatsSnapshot,
    },
    /// 캡처 중 주기적 통계 갱신
    Heartbeat {
        timestamp: DateTime<Utc>,
        stats: StatsSnapshot,
    },
}

impl HubMessage {
    /// 메시지 종류 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CaptureStatus { .. } => "capture_status",
            Self::NewLog { .. } => "new_log",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// 관찰자가 보내는 제어 명령
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    StartCapture,
    StopCapture,
}

impl ControlCommand {
    /// 텍스트 프레임을 명령으로 해석합니다.
    ///
    /// `{"command":"start_capture"}` 형태의 JSON과 `start_capture` 같은 이름 단독을 모두 허용합니다.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let text = text.trim();
        match text {
            "start_capture" => return Ok(Self::StartCapture),
            "stop_capture" => return Ok(Self::StopCapture),
            _ => {}
        }
        serde_json::from_str(text).map_err(|e| EngineError::Command(e.to_string()))
    }
}

// =============================================================================
// Outbox / Subscription
// =============================================================================

#[derive(Debug)]
struct Outbox {
    queue: Mutex<VecDeque<Arc<HubMessage>>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Outbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// 메시지를 넣습니다. 메시지 하나가 버려졌으면 `false`.
    fn offer(&self, message: Arc<HubMessage>, capacity: usize, policy: DropPolicy) -> bool {
        let delivered = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if queue.len() < capacity {
                queue.push_back(message);
                true
            } else {
                if policy == DropPolicy::Oldest {
                    queue.pop_front();
                    queue.push_back(message);
                }
                false
            }
        };
        if !delivered {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        delivered
    }

    fn pop(&self) -> Option<Arc<HubMessage>> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// 구독 식별자
pub type SubscriberId = u64;

type Registry = Mutex<HashMap<SubscriberId, Arc<Outbox>>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<SubscriberId, Arc<Outbox>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 레지스트리에서 관찰자를 빼고 outbox를 닫습니다. 이미 없으면 `false`.
fn detach(registry: &Registry, id: SubscriberId) -> bool {
    let (removed, count) = {
        let mut subscribers = lock_registry(registry);
        let removed = subscribers.remove(&id);
        (removed, subscribers.len())
    };
    let Some(outbox) = removed else {
        return false;
    };
    outbox.close();
    metrics::gauge!(m::HUB_SUBSCRIBERS).set(count as f64);
    debug!(subscriber = id, total = count, "observer unsubscribed");
    true
}

/// 관찰자 한 명의 수신 핸들
///
/// 핸들을 drop하면 구독도 해제됩니다.
#[derive(Debug)]
#[must_use = "dropping a subscription unsubscribes the observer"]
pub struct Subscription {
    id: SubscriberId,
    outbox: Arc<Outbox>,
    registry: Weak<Registry>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            detach(&registry, self.id);
        }
        self.outbox.close();
    }
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// 다음 메시지를 기다립니다. 구독이 해제되고 outbox가 비면 `None`.
    pub async fn recv(&self) -> Option<Arc<HubMessage>> {
        loop {
            if let Some(message) = self.outbox.pop() {
                return Some(message);
            }
            if self.outbox.closed.load(Ordering::Acquire) {
                return None;
            }
            self.outbox.notify.notified().await;
        }
    }

    /// 대기 없이 메시지를 꺼냅니다.
    pub fn try_recv(&self) -> Option<Arc<HubMessage>> {
        self.outbox.pop()
    }

    /// 이 관찰자에게서 버려진 메시지 수
    pub fn dropped_count(&self) -> u64 {
        self.outbox.dropped.load(Ordering::Relaxed)
    }
}

// =============================================================================
// BroadcastHub
// =============================================================================

/// 관찰자 레지스트리와 fan-out
#[derive(Debug)]
pub struct BroadcastHub {
    subscribers: Arc<Registry>,
    next_id: AtomicU64,
    capacity: usize,
    policy: DropPolicy,
}

impl BroadcastHub {
    /// 관찰자별 outbox 용량과 드롭 정책으로 허브를 생성합니다.
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// 새 관찰자를 등록합니다. 등록 이후 발행된 메시지부터 받습니다.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let outbox = Arc::new(Outbox::new(self.capacity));
        let count = {
            let mut subscribers = self.lock();
            subscribers.insert(id, Arc::clone(&outbox));
            subscribers.len()
        };
        metrics::gauge!(m::HUB_SUBSCRIBERS).set(count as f64);
        debug!(subscriber = id, total = count, "observer subscribed");
        Subscription {
            id,
            outbox,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// 관찰자를 제거합니다. 알 수 없는 ID면 `false`.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        detach(&self.subscribers, id)
    }

    /// 현재 등록된 모든 관찰자에게 메시지를 발행합니다. 블록하지 않습니다.
    ///
    /// 드롭 없이 전달된 관찰자 수를 반환합니다.
    pub fn publish(&self, message: HubMessage) -> usize {
        let message = Arc::new(message);
        // 레지스트리 락은 outbox 목록을 복사하는 동안만 보유
        let outboxes: Vec<Arc<Outbox>> = self.lock().values().cloned().collect();

        let mut delivered = 0;
        for outbox in &outboxes {
            if outbox.offer(Arc::clone(&message), self.capacity, self.policy) {
                delivered += 1;
            } else {
                metrics::counter!(m::HUB_MESSAGES_DROPPED_TOTAL).increment(1);
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Arc<Outbox>>> {
        lock_registry(&self.subscribers)
    }
}
