use std::{io::Cursor, path::PathBuf, slice};

use {bytes::Bytes, tokio::io::AsyncReadExt};

use crate::{Result, resource::ByteStream};

/// One addressable byte stream of a representation.
#[derive(Debug, Clone)]
pub enum Artifact {
    File(PathBuf),
    Memory(Bytes),
}

impl Artifact {
    pub async fn open(&self) -> Result<ByteStream> {
        match self {
            Self::File(path) => Ok(Box::new(tokio::fs::File::open(path).await?)),
            Self::Memory(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }

    pub async fn read_all(&self) -> Result<Vec<u8>> {
        match self {
            Self::File(path) => Ok(tokio::fs::read(path).await?),
            Self::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// A derived artifact: one stream for images, ordered page streams for
/// documents.
#[derive(Debug, Clone)]
pub enum Representation {
    Single(Artifact),
    Pages(Vec<Artifact>),
}

impl Representation {
    /// All streams in order (one for `Single`).
    #[must_use]
    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            Self::Single(artifact) => slice::from_ref(artifact),
            Self::Pages(pages) => pages,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts().is_empty()
    }

    /// Read every stream fully, in order.
    pub async fn read_all(&self) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::with_capacity(self.len());
        for artifact in self.artifacts() {
            let mut stream = artifact.open().await?;
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            out.push(buf);
        }
        Ok(out)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_exposes_one_artifact() {
        let rep = Representation::Single(Artifact::Memory(Bytes::from_static(b"abc")));
        assert_eq!(rep.len(), 1);
        assert_eq!(rep.read_all().await.unwrap(), vec![b"abc".to_vec()]);
    }

    #[tokio::test]
    async fn pages_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let p2 = dir.path().join("p2");
        std::fs::write(&p2, b"two").unwrap();
        let rep = Representation::Pages(vec![
            Artifact::Memory(Bytes::from_static(b"one")),
            Artifact::File(p2),
        ]);
        assert_eq!(
            rep.read_all().await.unwrap(),
            vec![b"one".to_vec(), b"two".to_vec()]
        );
        assert!(Representation::Pages(vec![]).is_empty());
    }
}
