//! Scripted in-memory gateway for tests.
//!
//! Read calls are answered from canned return data keyed by exact calldata
//! (falling back to the 4-byte selector); unscripted calls revert. Filter
//! polls are scripted per topic0. Every send, raw send, nonce read and poll
//! is recorded so tests can assert on the remote traffic a component
//! produced.

use crate::gateway::{ChainGateway, FilterId, GatewayError, TxReceipt};

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol_types::SolCall;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub struct MockGateway {
    state: Mutex<MockState>,
}

struct MockState {
    head: u64,
    accounts: Vec<Address>,
    exact: HashMap<(Address, Bytes), Bytes>,
    by_selector: HashMap<(Address, [u8; 4]), Bytes>,
    failing_calls: HashMap<(Address, [u8; 4]), GatewayError>,
    calls: Vec<(Address, Bytes)>,

    scripts: HashMap<B256, VecDeque<Result<Vec<Log>, GatewayError>>>,
    failing_topics: HashSet<B256>,
    stalled_topics: HashSet<B256>,
    filters: HashMap<FilterId, B256>,
    created: Vec<Filter>,
    polls: HashMap<B256, usize>,
    uninstalled: Vec<FilterId>,
    next_filter: u64,

    nonce: u64,
    nonce_reads: usize,
    chain_id: u64,
    gas_price: u128,
    sent: Vec<TransactionRequest>,
    raw_sent: Vec<Bytes>,
    send_error: Option<GatewayError>,
    receipt_status: bool,
    receipt_block: u64,
    receipt_error: Option<GatewayError>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                head: 100,
                accounts: Vec::new(),
                exact: HashMap::new(),
                by_selector: HashMap::new(),
                failing_calls: HashMap::new(),
                calls: Vec::new(),
                scripts: HashMap::new(),
                failing_topics: HashSet::new(),
                stalled_topics: HashSet::new(),
                filters: HashMap::new(),
                created: Vec::new(),
                polls: HashMap::new(),
                uninstalled: Vec::new(),
                next_filter: 1,
                nonce: 7,
                nonce_reads: 0,
                chain_id: 31337,
                gas_price: 1_000_000_000,
                sent: Vec::new(),
                raw_sent: Vec::new(),
                send_error: None,
                receipt_status: true,
                receipt_block: 101,
                receipt_error: None,
            }),
        }
    }

    pub fn with_accounts(self, accounts: Vec<Address>) -> Self {
        self.state.lock().unwrap().accounts = accounts;
        self
    }

    /// Answer this exact call on `to` with `ret` (ABI-encoded return data).
    pub fn respond<C: SolCall>(&self, to: Address, call: C, ret: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .exact
            .insert((to, Bytes::from(call.abi_encode())), Bytes::from(ret));
    }

    /// Answer any call to `C` on `to`, whatever its arguments.
    pub fn respond_any<C: SolCall>(&self, to: Address, ret: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .by_selector
            .insert((to, C::SELECTOR), Bytes::from(ret));
    }

    /// Make every `C` call on `to` revert.
    pub fn fail_call<C: SolCall>(&self, to: Address) {
        self.fail_call_with::<C>(
            to,
            GatewayError::Rejected {
                code: 3,
                message: "execution reverted".to_string(),
            },
        );
    }

    /// Make every `C` call on `to` fail with `error`.
    pub fn fail_call_with<C: SolCall>(&self, to: Address, error: GatewayError) {
        self.state
            .lock()
            .unwrap()
            .failing_calls
            .insert((to, C::SELECTOR), error);
    }

    /// Queue poll results for filters on `topic`, consumed one per poll.
    /// Once drained, polls return no entries.
    pub fn script_filter(&self, topic: B256, results: Vec<Result<Vec<Log>, GatewayError>>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(topic)
            .or_default()
            .extend(results);
    }

    /// Polls of filters on `topic` are counted but never answer.
    pub fn stall_filter(&self, topic: B256) {
        self.state.lock().unwrap().stalled_topics.insert(topic);
    }

    pub fn fail_filter_creation(&self, topic: B256) {
        self.state.lock().unwrap().failing_topics.insert(topic);
    }

    pub fn set_receipt(&self, status: bool, block: u64) {
        let mut state = self.state.lock().unwrap();
        state.receipt_status = status;
        state.receipt_block = block;
    }

    pub fn fail_send(&self, error: GatewayError) {
        self.state.lock().unwrap().send_error = Some(error);
    }

    pub fn fail_receipt(&self, error: GatewayError) {
        self.state.lock().unwrap().receipt_error = Some(error);
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn raw_sent(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().raw_sent.clone()
    }

    /// Total submissions of either kind.
    pub fn submissions(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.sent.len() + state.raw_sent.len()
    }

    pub fn nonce_reads(&self) -> usize {
        self.state.lock().unwrap().nonce_reads
    }

    pub fn read_calls(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created_filters(&self) -> Vec<Filter> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn polls(&self, topic: B256) -> usize {
        self.state
            .lock()
            .unwrap()
            .polls
            .get(&topic)
            .copied()
            .unwrap_or(0)
    }

    pub fn uninstalled(&self) -> Vec<FilterId> {
        self.state.lock().unwrap().uninstalled.clone()
    }

    fn next_hash(state: &MockState) -> B256 {
        let n = state.sent.len() + state.raw_sent.len();
        keccak256(n.to_be_bytes())
    }
}

impl ChainGateway for MockGateway {
    async fn block_number(&self) -> Result<u64, GatewayError> {
        Ok(self.state.lock().unwrap().head)
    }

    async fn accounts(&self) -> Result<Vec<Address>, GatewayError> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((to, data.clone()));

        let mut selector = [0u8; 4];
        if data.len() >= 4 {
            selector.copy_from_slice(&data[..4]);
        }
        if let Some(err) = state.failing_calls.get(&(to, selector)) {
            return Err(err.clone());
        }
        if let Some(ret) = state.exact.get(&(to, data.clone())) {
            return Ok(ret.clone());
        }
        state
            .by_selector
            .get(&(to, selector))
            .cloned()
            .ok_or_else(|| GatewayError::Rejected {
                code: 3,
                message: format!("execution reverted: unscripted call to {to}: {data}"),
            })
    }

    async fn create_filter(&self, filter: &Filter) -> Result<FilterId, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state
            .failing_topics
            .iter()
            .any(|t| filter.topics[0].matches(t))
        {
            return Err(GatewayError::Transport("filter creation refused".to_string()));
        }
        // Unscripted filters share the zero key and always poll empty.
        let topic = state
            .scripts
            .keys()
            .copied()
            .find(|t| filter.topics[0].matches(t))
            .unwrap_or_default();

        let id = U256::from(state.next_filter);
        state.next_filter += 1;
        state.filters.insert(id, topic);
        state.created.push(filter.clone());
        Ok(id)
    }

    async fn poll_filter(&self, id: FilterId) -> Result<Vec<Log>, GatewayError> {
        {
            let mut state = self.state.lock().unwrap();
            let topic = *state
                .filters
                .get(&id)
                .ok_or_else(|| GatewayError::Transport("filter not found".to_string()))?;
            *state.polls.entry(topic).or_default() += 1;
            if !state.stalled_topics.contains(&topic) {
                return state
                    .scripts
                    .get_mut(&topic)
                    .and_then(|queue| queue.pop_front())
                    .unwrap_or_else(|| Ok(Vec::new()));
            }
        }
        std::future::pending().await
    }

    async fn uninstall_filter(&self, id: FilterId) -> Result<bool, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.uninstalled.push(id);
        Ok(state.filters.remove(&id).is_some())
    }

    async fn nonce(&self, _address: Address) -> Result<u64, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.nonce_reads += 1;
        Ok(state.nonce)
    }

    async fn chain_id(&self) -> Result<u64, GatewayError> {
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn gas_price(&self) -> Result<u128, GatewayError> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.send_error.clone() {
            return Err(err);
        }
        let hash = Self::next_hash(&state);
        state.sent.push(request);
        Ok(hash)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.send_error.clone() {
            return Err(err);
        }
        let hash = Self::next_hash(&state);
        state.raw_sent.push(raw);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx: B256, _timeout: Duration) -> Result<TxReceipt, GatewayError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = state.receipt_error.clone() {
            return Err(err);
        }
        Ok(TxReceipt {
            tx_hash: tx,
            status: state.receipt_status,
            block_number: Some(state.receipt_block),
            gas_used: 21_000,
        })
    }
}
