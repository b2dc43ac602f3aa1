//! A scriptable in-memory [`PaymentProcessor`].
//!
//! Each operation pops a scripted result from its queue, or succeeds with a generated handle when the queue
//! is empty. Every request is recorded so tests can assert on what the engine actually sent.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::traits::{
    AuthorizationHandle,
    AuthorizationRequest,
    PaymentProcessor,
    ProcessorError,
    ReversalHandle,
    ReversalRequest,
    TransferHandle,
    TransferRequest,
};

#[derive(Default)]
struct Inner {
    serial: u64,
    authorize_results: VecDeque<Result<AuthorizationHandle, ProcessorError>>,
    lookup_results: VecDeque<Result<Option<AuthorizationHandle>, ProcessorError>>,
    transfer_results: VecDeque<Result<TransferHandle, ProcessorError>>,
    reversal_results: VecDeque<Result<ReversalHandle, ProcessorError>>,
    authorize_calls: Vec<AuthorizationRequest>,
    lookup_calls: Vec<String>,
    transfer_calls: Vec<TransferRequest>,
    reversal_calls: Vec<ReversalRequest>,
}

#[derive(Clone, Default)]
pub struct StubProcessor {
    inner: Arc<Mutex<Inner>>,
}

impl StubProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_authorize(&self, result: Result<AuthorizationHandle, ProcessorError>) {
        self.inner.lock().unwrap().authorize_results.push_back(result);
    }

    pub fn script_lookup(&self, result: Result<Option<AuthorizationHandle>, ProcessorError>) {
        self.inner.lock().unwrap().lookup_results.push_back(result);
    }

    pub fn script_transfer(&self, result: Result<TransferHandle, ProcessorError>) {
        self.inner.lock().unwrap().transfer_results.push_back(result);
    }

    /// Script `n` consecutive transfer failures.
    pub fn script_transfer_failures(&self, n: usize, error: ProcessorError) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..n {
            inner.transfer_results.push_back(Err(error.clone()));
        }
    }

    pub fn script_reversal(&self, result: Result<ReversalHandle, ProcessorError>) {
        self.inner.lock().unwrap().reversal_results.push_back(result);
    }

    pub fn authorize_calls(&self) -> Vec<AuthorizationRequest> {
        self.inner.lock().unwrap().authorize_calls.clone()
    }

    pub fn lookup_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().lookup_calls.clone()
    }

    pub fn transfer_calls(&self) -> Vec<TransferRequest> {
        self.inner.lock().unwrap().transfer_calls.clone()
    }

    pub fn reversal_calls(&self) -> Vec<ReversalRequest> {
        self.inner.lock().unwrap().reversal_calls.clone()
    }
}

impl PaymentProcessor for StubProcessor {
    async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthorizationHandle, ProcessorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.authorize_calls.push(request);
        match inner.authorize_results.pop_front() {
            Some(result) => result,
            None => {
                inner.serial += 1;
                Ok(AuthorizationHandle { authorization_id: format!("auth_{}", inner.serial) })
            },
        }
    }

    async fn lookup_authorization(&self, idempotency_key: &str) -> Result<Option<AuthorizationHandle>, ProcessorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.lookup_calls.push(idempotency_key.to_string());
        inner.lookup_results.pop_front().unwrap_or(Ok(None))
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferHandle, ProcessorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.transfer_calls.push(request);
        match inner.transfer_results.pop_front() {
            Some(result) => result,
            None => {
                inner.serial += 1;
                Ok(TransferHandle { transfer_id: format!("tr_{}", inner.serial) })
            },
        }
    }

    async fn reverse(&self, request: ReversalRequest) -> Result<ReversalHandle, ProcessorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.reversal_calls.push(request);
        match inner.reversal_results.pop_front() {
            Some(result) => result,
            None => {
                inner.serial += 1;
                Ok(ReversalHandle { reversal_id: format!("rev_{}", inner.serial) })
            },
        }
    }
}
