use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use anyhow::Context;
use enum_dispatch::enum_dispatch;
use tracing::error;

const ALPHABET: base32::Alphabet = base32::Alphabet::Crockford;

/// Identifier for one `exec` invocation. Displayed as Crockford base32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobId {
    Uuid(uuid::Uuid),
    Sonyflake(u64),
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobId::Uuid(u) => base32::encode(ALPHABET, u.as_bytes()),
            JobId::Sonyflake(s) => base32::encode(ALPHABET, &s.to_be_bytes()),
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = base32::decode(ALPHABET, s.trim())
            .with_context(|| format!("job id is not valid base32: {s}"))?;
        let id = match bytes.len() {
            8 => {
                let raw: [u8; 8] = bytes.as_slice().try_into()?;
                JobId::Sonyflake(u64::from_be_bytes(raw))
            }
            16 => JobId::Uuid(uuid::Uuid::from_slice(&bytes)?),
            len => bail!("job id has unexpected length {len}: {s}"),
        };
        Ok(id)
    }
}

#[enum_dispatch]
pub trait IdGenerator {
    fn id_now(&self) -> JobId;
}

#[enum_dispatch(IdGenerator)]
pub enum IdGeneratorImpl {
    UuidV7(UuidV7Generator),
    Sonyflake(SonyflakeGenerator),
}

impl IdGeneratorImpl {
    /// Sonyflake keyed on the hostname, or UUIDv7 if that cannot be set up.
    #[must_use]
    pub fn from_hostname_or_uuid() -> Self {
        match SonyflakeGenerator::from_hostname() {
            Ok(generator) => generator.into(),
            Err(error) => {
                error!(?error, "sonyflake setup failed, falling back to uuidv7");
                UuidV7Generator.into()
            }
        }
    }
}

// UUIDv7 ---------------------------------------------------------------------

pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn id_now(&self) -> JobId {
        JobId::Uuid(uuid::Uuid::now_v7())
    }
}

// Sonyflake ------------------------------------------------------------------

pub struct SonyflakeGenerator {
    sonyflake: sonyflake::Sonyflake,
}

impl SonyflakeGenerator {
    /// Uses a hash of the machine's hostname as machine ID.
    ///
    /// # Errors
    ///
    /// - If the hostname cannot be read
    /// - If the generator fails to build
    pub fn from_hostname() -> anyhow::Result<Self> {
        let sonyflake = sonyflake::Sonyflake::builder()
            .machine_id(&machine_id_from_hostname)
            .finalize()?;
        Ok(Self { sonyflake })
    }
}

impl IdGenerator for SonyflakeGenerator {
    fn id_now(&self) -> JobId {
        JobId::Sonyflake(self.sonyflake.next_id().unwrap_or_else(|error| {
            error!(?error, "sonyflake id error, falling back to 0");
            0
        }))
    }
}

fn machine_id_from_hostname() -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
    use std::hash::Hash;
    use std::hash::Hasher;

    let mut hasher = std::hash::DefaultHasher::new();
    whoami::fallible::hostname()?.hash(&mut hasher);
    let hash = hasher.finish();

    // Fold 64 bits down to 16 by XOR; distributes better than truncation.
    let folded = (hash >> 32) ^ (hash & 0xFFFF_FFFF);
    let folded = folded ^ (folded >> 16);
    Ok(u16::try_from(folded & 0xFFFF)?)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(JobId::Sonyflake(0x0123_4567_89AB_CDEF))]
    #[case(JobId::Uuid(uuid::Uuid::now_v7()))]
    fn display_parses_back(#[case] id: JobId) {
        let parsed = JobId::from_str(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[rstest]
    #[case("@@@@")]
    #[case("AAAA")]
    fn parse_rejects_garbage(#[case] s: &str) {
        assert!(JobId::from_str(s).is_err());
    }

    #[test]
    fn uuid_ids_are_unique() {
        let generator: IdGeneratorImpl = UuidV7Generator.into();
        assert_ne!(generator.id_now(), generator.id_now());
    }
}
