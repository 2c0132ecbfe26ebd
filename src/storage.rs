use anyhow::{Context, Result};
use facegate_vision::{Embedding, EnrollmentSet};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const STORE_FILE: &str = "enrollments.bin";
const LOCK_FILE: &str = "enrollments.lock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: String,
    pub identity: String,
    pub embedding: Vec<f32>,
    pub enrolled_at: u64,
}

impl FaceRecord {
    pub fn new(identity: &str, embedding: &Embedding) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            embedding: embedding.to_vec(),
            enrolled_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }
}

/// File-backed enrollment store. Every call reads the file afresh, so each
/// caller gets its own consistent snapshot. Mutations hold an exclusive lock
/// on a sibling lock file for their whole read-modify-write cycle, so
/// concurrent `facegate` processes never drop each other's updates.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    pub fn load_records(&self) -> Result<Vec<FaceRecord>> {
        let file = self.path();
        if !file.exists() {
            return Ok(vec![]);
        }
        let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
        postcard::from_bytes(&data).with_context(|| format!("decoding {}", file.display()))
    }

    /// Held until the returned handle is dropped.
    fn lock(&self) -> Result<File> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        file.lock()
            .with_context(|| format!("locking {}", path.display()))?;
        Ok(file)
    }

    fn write_records(&self, records: &[FaceRecord]) -> Result<()> {
        let data = postcard::to_allocvec(records)?;

        // Write then rename so readers never see a torn file.
        let file = self.path();
        let tmp = self.dir.join(format!("{STORE_FILE}.{}.tmp", uuid::Uuid::new_v4()));
        if let Err(e) = std::fs::write(&tmp, data) {
            std::fs::remove_file(&tmp).ok();
            return Err(e).with_context(|| format!("writing {}", tmp.display()));
        }
        if let Err(e) = std::fs::rename(&tmp, &file) {
            std::fs::remove_file(&tmp).ok();
            return Err(e).with_context(|| format!("replacing {}", file.display()));
        }
        Ok(())
    }

    /// Enrollment set snapshot in enrollment order.
    pub fn snapshot(&self) -> Result<EnrollmentSet> {
        Ok(self
            .load_records()?
            .into_iter()
            .map(|r| (r.identity, Embedding::new(r.embedding)))
            .collect())
    }

    pub fn get(&self, identity: &str) -> Result<Option<FaceRecord>> {
        Ok(self
            .load_records()?
            .into_iter()
            .find(|r| r.identity == identity))
    }

    pub fn contains(&self, identity: &str) -> Result<bool> {
        Ok(self.get(identity)?.is_some())
    }

    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .load_records()?
            .into_iter()
            .map(|r| r.identity)
            .collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.load_records()?.len())
    }

    /// Store a record, replacing any previous enrollment of the same
    /// identity in place. Returns whether one was replaced.
    pub fn enroll(&self, record: FaceRecord) -> Result<bool> {
        let _lock = self.lock()?;
        let mut records = self.load_records()?;
        let replaced = match records.iter_mut().find(|r| r.identity == record.identity) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                records.push(record);
                false
            }
        };
        self.write_records(&records)?;
        Ok(replaced)
    }

    /// Returns whether the identity was enrolled.
    pub fn remove(&self, identity: &str) -> Result<bool> {
        let _lock = self.lock()?;
        let mut records = self.load_records()?;
        let before = records.len();
        records.retain(|r| r.identity != identity);
        if records.len() == before {
            return Ok(false);
        }
        self.write_records(&records)?;
        Ok(true)
    }

    /// Drop every enrollment. Returns how many were removed.
    pub fn purge(&self) -> Result<usize> {
        let _lock = self.lock()?;
        let count = self.load_records()?.len();
        let file = self.path();
        if file.exists() {
            std::fs::remove_file(&file).with_context(|| format!("removing {}", file.display()))?;
        }
        Ok(count)
    }
}
