//! 최근 이벤트 링 -- 용량이 고정된 삽입 순서 버퍼
//!
//! 가득 차면 가장 오래된 이벤트부터 제거합니다 (strict FIFO).
//! 날짜/종류 검색은 영속 저장소의 `query_events`가 담당하며, 링은 메모리 내 최신 구간만 보관합니다.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use packetward_core::metrics as m;
use packetward_core::types::ClassifiedEvent;

#[derive(Debug)]
struct RingState {
    events: VecDeque<ClassifiedEvent>,
    evicted: u64,
}

/// 최근 이벤트 링 버퍼
#[derive(Debug)]
pub struct EventRing {
    state: RwLock<RingState>,
    capacity: usize,
}

impl EventRing {
    /// 지정된 용량으로 링을 생성합니다. 용량 0은 1로 취급합니다.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: RwLock::new(RingState {
                events: VecDeque::with_capacity(capacity),
                evicted: 0,
            }),
            capacity,
        }
    }

    /// 이벤트를 추가합니다. 용량을 넘으면 가장 오래된 항목이 제거됩니다.
    pub fn push(&self, event: ClassifiedEvent) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.events.len() >= self.capacity {
            state.events.pop_front();
            state.evicted += 1;
        }
        state.events.push_back(event);
        metrics::gauge!(m::ENGINE_RING_SIZE).set(state.events.len() as f64);
    }

    /// 전체 내용을 오래된 순서로 복사하여 반환합니다 (가장 최근 항목이 마지막).
    pub fn all(&self) -> Vec<ClassifiedEvent> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.events.iter().cloned().collect()
    }

    /// 모든 이벤트를 제거합니다.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.events.clear();
        metrics::gauge!(m::ENGINE_RING_SIZE).set(0.0);
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 생성 이후 용량 초과로 제거된 누적 이벤트 수
    pub fn evicted_count(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .evicted
    }
}
