//! The shared authorization key (spec §6, §4.J step "keyread"). The
//! reference daemon reads a fixed-size key used to authenticate totem
//! traffic between ring members; we read and validate it the same way even
//! though the single-node transport never exchanges it over the wire.

use std::path::Path;

pub const KEY_LENGTH: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    Read { path: std::path::PathBuf, #[source] source: std::io::Error },
    #[error("key file {path} is {actual} bytes, expected {KEY_LENGTH}")]
    WrongLength { path: std::path::PathBuf, actual: usize },
}

pub fn read_key(path: &Path) -> Result<[u8; KEY_LENGTH], KeyError> {
    let bytes =
        std::fs::read(path).map_err(|source| KeyError::Read { path: path.to_owned(), source })?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| KeyError::WrongLength { path: path.to_owned(), actual })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_short_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authkey");
        std::fs::write(&path, vec![0_u8; 16]).unwrap();

        let err = read_key(&path).unwrap_err();
        assert!(matches!(err, KeyError::WrongLength { actual: 16, .. }));
    }

    #[test]
    fn accepts_a_128_byte_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authkey");
        std::fs::write(&path, vec![0x42_u8; KEY_LENGTH]).unwrap();

        let key = read_key(&path).unwrap();
        assert_eq!(key.len(), KEY_LENGTH);
    }
}
