//! 재생 소스 -- JSON lines 파일의 레코드를 순서대로 공급
//!
//! 한 줄에 [`TrafficRecord`] 하나. 파싱할 수 없는 줄은 경고 후 건너뜁니다.
//! 파일 끝에 도달하면 [`SourcePoll::Exhausted`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use packetward_core::error::SourceError;
use packetward_core::pipeline::{RecordSource, SourcePoll};
use packetward_core::types::TrafficRecord;

pub struct ReplaySource {
    path: PathBuf,
    reader: BufReader<File>,
    line_no: usize,
    skipped: u64,
}

impl ReplaySource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| SourceError::Open(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
            line_no: 0,
            skipped: 0,
        })
    }

    /// 파싱 실패로 건너뛴 줄 수
    pub fn skipped_lines(&self) -> u64 {
        self.skipped
    }
}

impl RecordSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn poll_next(&mut self) -> Result<SourcePoll, SourceError> {
        let mut line = Vec::new();
        loop {
            line.clear();
            // 바이트 단위로 읽어 UTF-8이 아닌 줄도 건너뛸 수 있게 함
            let read = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(|e| SourceError::Read(format!("{}: {e}", self.path.display())))?;
            if read == 0 {
                return Ok(SourcePoll::Exhausted);
            }
            self.line_no += 1;

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_slice::<TrafficRecord>(trimmed) {
                Ok(record) => return Ok(SourcePoll::Record(record)),
                Err(e) => {
                    self.skipped += 1;
                    warn!(
                        path = %self.path.display(),
                        line = self.line_no,
                        error = %e,
                        "skipping malformed replay record"
                    );
                }
            }
        }
    }
}
