//! In-memory logstore.
//!
//! Reference implementation backing tests and embedders that bring
//! their own durability. Short-lived `RwLock` critical sections, no
//! await points while locked.

use crate::edge::{self, LogHead};
use crate::error::LogstoreError;
use crate::store::Logstore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use strand_model::thread::canonical_addrs;
use strand_model::{Cid, Key, LogInfo, PeerId, PubKey, Record, ThreadId, ThreadInfo, ThreadKey};

struct LogEntry {
    info: LogInfo,
    chain: Vec<Record>,
}

#[derive(Default)]
struct ThreadEntry {
    key: ThreadKey,
    logs: HashMap<PeerId, LogEntry>,
}

#[derive(Default)]
struct State {
    threads: HashMap<ThreadId, ThreadEntry>,
    known: HashSet<Cid>,
}

/// In-memory implementation of [`Logstore`].
#[derive(Default)]
pub struct MemLogstore {
    state: RwLock<State>,
}

impl MemLogstore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, LogstoreError> {
        self.state
            .read()
            .map_err(|_| LogstoreError::Storage("lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, LogstoreError> {
        self.state
            .write()
            .map_err(|_| LogstoreError::Storage("lock poisoned".into()))
    }
}

#[async_trait]
impl Logstore for MemLogstore {
    async fn threads(&self) -> Result<Vec<ThreadId>, LogstoreError> {
        Ok(self.read()?.threads.keys().copied().collect())
    }

    async fn thread_info(&self, tid: ThreadId) -> Result<ThreadInfo, LogstoreError> {
        let state = self.read()?;
        let entry = state
            .threads
            .get(&tid)
            .ok_or(LogstoreError::ThreadNotFound)?;
        Ok(ThreadInfo {
            id: tid,
            key: entry.key.clone(),
            logs: entry.logs.values().map(|l| l.info.clone()).collect(),
        })
    }

    async fn add_thread(&self, info: ThreadInfo) -> Result<(), LogstoreError> {
        let mut state = self.write()?;
        let entry = state.threads.entry(info.id).or_default();
        entry.key = info.key;
        for log in info.logs {
            // Heads only ever advance through put_record, so a freshly
            // added log always starts empty.
            entry.logs.entry(log.id).or_insert_with(|| LogEntry {
                info: LogInfo {
                    addrs: canonical_addrs(&log.addrs),
                    head: None,
                    ..log
                },
                chain: Vec::new(),
            });
        }
        Ok(())
    }

    async fn add_service_key(&self, tid: ThreadId, key: Key) -> Result<(), LogstoreError> {
        let mut state = self.write()?;
        let entry = state.threads.entry(tid).or_default();
        match entry.key.service {
            None => {
                entry.key.service = Some(key);
                Ok(())
            }
            Some(existing) if existing == key => Ok(()),
            Some(_) => Err(LogstoreError::Storage(
                "service key already set for thread".into(),
            )),
        }
    }

    async fn add_read_key(&self, tid: ThreadId, key: Key) -> Result<(), LogstoreError> {
        let mut state = self.write()?;
        let entry = state
            .threads
            .get_mut(&tid)
            .ok_or(LogstoreError::ThreadNotFound)?;
        match entry.key.read {
            None => {
                entry.key.read = Some(key);
                Ok(())
            }
            Some(existing) if existing == key => Ok(()),
            Some(_) => Err(LogstoreError::Storage(
                "read key already set for thread".into(),
            )),
        }
    }

    async fn service_key(&self, tid: ThreadId) -> Result<Option<Key>, LogstoreError> {
        Ok(self.read()?.threads.get(&tid).and_then(|t| t.key.service))
    }

    async fn read_key(&self, tid: ThreadId) -> Result<Option<Key>, LogstoreError> {
        Ok(self.read()?.threads.get(&tid).and_then(|t| t.key.read))
    }

    async fn add_log(&self, tid: ThreadId, log: LogInfo) -> Result<(), LogstoreError> {
        let mut state = self.write()?;
        let entry = state
            .threads
            .get_mut(&tid)
            .ok_or(LogstoreError::ThreadNotFound)?;
        entry.logs.entry(log.id).or_insert_with(|| LogEntry {
            info: LogInfo {
                addrs: canonical_addrs(&log.addrs),
                head: None,
                ..log
            },
            chain: Vec::new(),
        });
        Ok(())
    }

    async fn update_addrs(
        &self,
        tid: ThreadId,
        lid: PeerId,
        addrs: &[String],
    ) -> Result<(), LogstoreError> {
        let mut state = self.write()?;
        let entry = state
            .threads
            .get_mut(&tid)
            .ok_or(LogstoreError::ThreadNotFound)?;
        let log = entry.logs.get_mut(&lid).ok_or(LogstoreError::LogNotFound)?;
        let mut merged = log.info.addrs.clone();
        merged.extend_from_slice(addrs);
        log.info.addrs = canonical_addrs(&merged);
        Ok(())
    }

    async fn log_pub_key(
        &self,
        tid: ThreadId,
        lid: PeerId,
    ) -> Result<Option<PubKey>, LogstoreError> {
        Ok(self
            .read()?
            .threads
            .get(&tid)
            .and_then(|t| t.logs.get(&lid))
            .map(|l| l.info.pub_key))
    }

    async fn head(&self, tid: ThreadId, lid: PeerId) -> Result<Option<Cid>, LogstoreError> {
        Ok(self
            .read()?
            .threads
            .get(&tid)
            .and_then(|t| t.logs.get(&lid))
            .and_then(|l| l.info.head))
    }

    async fn is_known(&self, cid: Cid) -> Result<bool, LogstoreError> {
        Ok(self.read()?.known.contains(&cid))
    }

    async fn put_record(
        &self,
        tid: ThreadId,
        lid: PeerId,
        record: Record,
    ) -> Result<(), LogstoreError> {
        let mut state = self.write()?;
        if state.known.contains(&record.cid()) {
            return Ok(());
        }
        let entry = state
            .threads
            .get_mut(&tid)
            .ok_or(LogstoreError::ThreadNotFound)?;
        let log = entry.logs.get_mut(&lid).ok_or(LogstoreError::LogNotFound)?;
        if record.prev() != log.info.head {
            return Err(LogstoreError::HeadMismatch);
        }
        let cid = record.cid();
        log.info.head = Some(cid);
        log.chain.push(record);
        state.known.insert(cid);
        Ok(())
    }

    async fn records_after(
        &self,
        tid: ThreadId,
        lid: PeerId,
        offset: Option<Cid>,
        limit: usize,
    ) -> Result<Vec<Record>, LogstoreError> {
        let state = self.read()?;
        let entry = state
            .threads
            .get(&tid)
            .ok_or(LogstoreError::ThreadNotFound)?;
        let log = entry.logs.get(&lid).ok_or(LogstoreError::LogNotFound)?;
        let start = match offset {
            None => 0,
            Some(c) => {
                let at = log
                    .chain
                    .iter()
                    .position(|r| r.cid() == c)
                    .ok_or(LogstoreError::OffsetMissing)?;
                at + 1
            }
        };
        Ok(log.chain.iter().skip(start).take(limit).cloned().collect())
    }

    async fn addrs_edge(&self, tid: ThreadId) -> Result<u64, LogstoreError> {
        let state = self.read()?;
        let entry = state
            .threads
            .get(&tid)
            .ok_or(LogstoreError::ThreadNotFound)?;
        if entry.logs.is_empty() {
            return Err(LogstoreError::ThreadNotFound);
        }
        let logs: Vec<LogInfo> = entry.logs.values().map(|l| l.info.clone()).collect();
        Ok(edge::addrs_edge(&logs))
    }

    async fn heads_edge(&self, tid: ThreadId) -> Result<u64, LogstoreError> {
        let state = self.read()?;
        let entry = state
            .threads
            .get(&tid)
            .ok_or(LogstoreError::ThreadNotFound)?;
        let heads: Vec<LogHead> = entry
            .logs
            .values()
            .filter_map(|l| {
                l.info.head.map(|head| LogHead {
                    id: l.info.id,
                    head,
                })
            })
            .collect();
        if heads.is_empty() {
            return Err(LogstoreError::ThreadNotFound);
        }
        Ok(edge::heads_edge(&heads))
    }
}
