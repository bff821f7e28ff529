// 测试用媒体源

use super::source::MediaSource;
use crate::error::MediaError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 记录数据源生命周期调用次数
#[derive(Debug, Clone, Default)]
pub(crate) struct SourceProbe {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    captures: Arc<AtomicUsize>,
}

impl SourceProbe {
    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub(crate) fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

/// 每次返回固定内容的数据源
pub(crate) struct FixedSource {
    unit: Bytes,
    /// 成功采集次数上限，用完后返回 `Unavailable`
    limit: Option<usize>,
    /// 第 k、2k、3k... 次采集失败
    fail_every: Option<usize>,
    fail_start: bool,
    running: bool,
    produced: usize,
    probe: SourceProbe,
}

impl FixedSource {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            unit: Bytes::from(vec![0xAB; size]),
            limit: None,
            fail_every: None,
            fail_start: false,
            running: false,
            produced: 0,
            probe: SourceProbe::default(),
        }
    }

    pub(crate) fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn failing_every(mut self, k: usize) -> Self {
        self.fail_every = Some(k.max(1));
        self
    }

    pub(crate) fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub(crate) fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl MediaSource for FixedSource {
    async fn start(&mut self) -> Result<(), MediaError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(MediaError::Device("no camera".to_string()));
        }
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), MediaError> {
        if self.running {
            self.running = false;
            self.probe.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn capture_unit(&mut self) -> Result<Bytes, MediaError> {
        if !self.running {
            return Err(MediaError::NotStarted("fixed source"));
        }

        let attempt = self.probe.captures.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(k) = self.fail_every {
            if attempt % k == 0 {
                return Err(MediaError::Unavailable(format!("capture {} failed", attempt)));
            }
        }
        if let Some(limit) = self.limit {
            if self.produced >= limit {
                return Err(MediaError::Unavailable("source exhausted".to_string()));
            }
        }

        self.produced += 1;
        Ok(self.unit.clone())
    }
}
