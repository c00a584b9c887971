use crate::remote::{DocumentSource, RemoteMetadata, RetrievalError};
use doc_model::DocumentId;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory document service that counts byte fetches.
#[derive(Debug, Default)]
pub struct FakeSource {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    metadata: Mutex<HashMap<String, RemoteMetadata>>,
    metadata_offline: Mutex<bool>,
    byte_fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, id: &str, bytes: Vec<u8>) -> Self {
        self.set_document(id, bytes);
        self
    }

    pub fn set_document(&self, id: &str, bytes: Vec<u8>) {
        self.documents.lock().unwrap().insert(id.to_owned(), bytes);
    }

    pub fn set_metadata(&self, id: &str, metadata: RemoteMetadata) {
        self.metadata.lock().unwrap().insert(id.to_owned(), metadata);
    }

    pub fn set_metadata_offline(&self, offline: bool) {
        *self.metadata_offline.lock().unwrap() = offline;
    }

    pub fn byte_fetches(&self) -> usize {
        self.byte_fetches.load(Ordering::SeqCst)
    }
}

impl DocumentSource for FakeSource {
    fn fetch_bytes(&self, id: &DocumentId) -> BoxFuture<'static, Result<Vec<u8>, RetrievalError>> {
        self.byte_fetches.fetch_add(1, Ordering::SeqCst);
        let result = self
            .documents
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| RetrievalError::Service(format!("no document {id}")));

        async move {
            tokio::task::yield_now().await;
            result
        }
        .boxed()
    }

    fn fetch_metadata(
        &self,
        id: &DocumentId,
    ) -> BoxFuture<'static, Result<RemoteMetadata, RetrievalError>> {
        let result = if *self.metadata_offline.lock().unwrap() {
            Err(RetrievalError::Network("offline".to_owned()))
        } else {
            Ok(self
                .metadata
                .lock()
                .unwrap()
                .get(id.as_str())
                .cloned()
                .unwrap_or(RemoteMetadata { name: None, modified_at: None }))
        };
        futures::future::ready(result).boxed()
    }
}
