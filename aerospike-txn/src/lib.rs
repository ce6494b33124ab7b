// Multi-record transaction coordinator (spec §4.9). Each transaction
// carries a `txn_id`, a client-side state machine, and a sticky
// in-doubt flag: once any command in the transaction observes a
// possibly-applied write failure, `in_doubt` stays set until commit
// completes (spec §8 invariant #8 — the client must never implicitly
// retry an in-doubt write).

use std::collections::{BTreeMap, BTreeSet};

use aerospike_base::{err, ErrorKind, Result};

/// Client-visible transaction lifecycle (spec §3 Transaction, §8
/// invariant #7: state only ever moves forward).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Open,
    Verified,
    Committed,
    Aborted,
}

impl State {
    fn can_advance_to(self, next: State) -> bool {
        matches!(
            (self, next),
            (State::Open, State::Verified)
                | (State::Open, State::Aborted)
                | (State::Verified, State::Committed)
                | (State::Verified, State::Aborted)
        )
    }
}

/// Non-fatal tail outcomes of `commit`/`abort` (spec §4.9 steps 3-4):
/// the monitor sweep converges these server-side even if the client
/// gave up waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    Aborted,
    RollForwardAbandoned,
    CloseAbandoned,
}

/// A single record's identity inside a transaction's footprint,
/// represented by its digest rather than the full `Key` so it can
/// live in an ordered map without requiring `Key: Hash`.
pub type RecordDigest = [u8; aerospike_buf::DIGEST_LEN];

/// Pluggable backend for the four server round-trips `commit`/`abort`
/// drive. A real client implements this against the sync command
/// engine in `aerospike-client`; tests implement it in memory.
pub trait TxnBackend {
    /// Batch-reads the write set's pre-images and compares them
    /// against `read_versions`; returns `Ok(())` if they all still
    /// match, `Err` (any kind) otherwise.
    fn verify(&mut self, txn_id: i64, write_set: &BTreeSet<RecordDigest>) -> Result<()>;
    fn mark_roll_forward(&mut self, txn_id: i64) -> Result<()>;
    fn roll_forward(&mut self, txn_id: i64, write_set: &BTreeSet<RecordDigest>) -> Result<()>;
    fn roll_back(&mut self, txn_id: i64, write_set: &BTreeSet<RecordDigest>) -> Result<()>;
    fn remove_monitor(&mut self, txn_id: i64) -> Result<()>;
}

/// Client-side transaction handle (spec §3 Transaction). Single-
/// owner: concurrent operations on the same handle must be serialized
/// by the caller (spec §5 Shared-resource policy).
pub struct Transaction {
    txn_id: i64,
    state: State,
    in_doubt: bool,
    monitor_exists: bool,
    read_versions: BTreeMap<RecordDigest, u32>,
    write_set: BTreeSet<RecordDigest>,
}

impl Transaction {
    pub fn new(txn_id: i64) -> Self {
        Self {
            txn_id,
            state: State::Open,
            in_doubt: false,
            monitor_exists: false,
            read_versions: BTreeMap::new(),
            write_set: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.txn_id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn in_doubt(&self) -> bool {
        self.in_doubt
    }

    /// Set by the command engine the moment a write times out or
    /// hits a connection error after the socket-write phase (spec §7:
    /// "in_doubt... set when a write failure occurs after the
    /// socket-write phase"). Sticky until commit/abort completes.
    pub fn mark_in_doubt(&mut self) {
        self.in_doubt = true;
    }

    pub fn record_read(&mut self, digest: RecordDigest, generation: u32) {
        self.read_versions.insert(digest, generation);
    }

    pub fn record_write(&mut self, digest: RecordDigest) {
        self.write_set.insert(digest);
    }

    pub fn note_monitor_created(&mut self) {
        self.monitor_exists = true;
    }

    fn advance(&mut self, next: State) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(err(
                ErrorKind::TxnFailed,
                "illegal transaction state transition",
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Runs the full commit sequence (spec §4.9 steps 1-4). Only
    /// steps 1-2 can fail the whole commit outright (verify mismatch,
    /// or a server-side abort/in-doubt on mark-roll-forward); steps
    /// 3-4 are best-effort and degrade to `RollForwardAbandoned`/
    /// `CloseAbandoned` rather than failing, since the server-side
    /// monitor sweep will converge them eventually.
    pub fn commit(&mut self, backend: &mut impl TxnBackend) -> Result<Outcome> {
        if self.state == State::Committed {
            return Err(err(ErrorKind::TxnAlreadyCommitted, "transaction already committed"));
        }
        if self.state == State::Aborted {
            return Err(err(ErrorKind::TxnAlreadyAborted, "transaction already aborted"));
        }

        if self.state == State::Open {
            if let Err(e) = backend.verify(self.txn_id, &self.write_set) {
                self.advance(State::Aborted)?;
                let _ = backend.roll_back(self.txn_id, &self.write_set);
                let _ = backend.remove_monitor(self.txn_id);
                return Err(e);
            }
            self.advance(State::Verified)?;
        }

        if self.monitor_exists {
            match backend.mark_roll_forward(self.txn_id) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::MrtAborted => {
                    self.advance(State::Aborted)?;
                    return Err(e);
                }
                Err(e) => {
                    // Any other failure: the write may still land
                    // server-side. Leave in_doubt set and keep going —
                    // the roll-forward attempt below is what actually
                    // resolves it, one way or the other.
                    self.mark_in_doubt();
                    tracing::warn!(txn_id = self.txn_id, error = %e, "mark-roll-forward failed, continuing in-doubt");
                }
            }
        }

        if backend.roll_forward(self.txn_id, &self.write_set).is_err() {
            return Ok(Outcome::RollForwardAbandoned);
        }
        self.advance(State::Committed)?;
        self.in_doubt = false;

        if backend.remove_monitor(self.txn_id).is_err() {
            return Ok(Outcome::CloseAbandoned);
        }
        Ok(Outcome::Committed)
    }

    /// Skips verify/mark entirely: roll-back then monitor-remove,
    /// with the same non-fatal tail as `commit` (spec §4.9 "abort").
    pub fn abort(&mut self, backend: &mut impl TxnBackend) -> Result<Outcome> {
        if self.state == State::Committed {
            return Err(err(ErrorKind::TxnAlreadyCommitted, "transaction already committed"));
        }
        if self.state == State::Aborted {
            return Err(err(ErrorKind::TxnAlreadyAborted, "transaction already aborted"));
        }

        let _ = backend.roll_back(self.txn_id, &self.write_set);
        self.advance(State::Aborted)?;
        self.in_doubt = false;

        if backend.remove_monitor(self.txn_id).is_err() {
            return Ok(Outcome::CloseAbandoned);
        }
        Ok(Outcome::Aborted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        verify_fails: bool,
        roll_forward_fails: bool,
    }

    impl TxnBackend for FakeBackend {
        fn verify(&mut self, _txn_id: i64, _write_set: &BTreeSet<RecordDigest>) -> Result<()> {
            if self.verify_fails {
                Err(err(ErrorKind::TxnFailed, "pre-image mismatch"))
            } else {
                Ok(())
            }
        }
        fn mark_roll_forward(&mut self, _txn_id: i64) -> Result<()> {
            Ok(())
        }
        fn roll_forward(&mut self, _txn_id: i64, _write_set: &BTreeSet<RecordDigest>) -> Result<()> {
            if self.roll_forward_fails {
                Err(err(ErrorKind::Connection, "timeout"))
            } else {
                Ok(())
            }
        }
        fn roll_back(&mut self, _txn_id: i64, _write_set: &BTreeSet<RecordDigest>) -> Result<()> {
            Ok(())
        }
        fn remove_monitor(&mut self, _txn_id: i64) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn happy_path_commits() {
        let mut txn = Transaction::new(1);
        txn.record_write([0u8; 20]);
        let mut backend = FakeBackend::default();
        let outcome = txn.commit(&mut backend).unwrap();
        assert_eq!(outcome, Outcome::Committed);
        assert_eq!(txn.state(), State::Committed);
        assert!(!txn.in_doubt());
    }

    #[test]
    fn verify_failure_aborts() {
        let mut txn = Transaction::new(2);
        let mut backend = FakeBackend {
            verify_fails: true,
            ..Default::default()
        };
        let err = txn.commit(&mut backend).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TxnFailed);
        assert_eq!(txn.state(), State::Aborted);
    }

    #[test]
    fn roll_forward_failure_is_non_fatal() {
        let mut txn = Transaction::new(3);
        let mut backend = FakeBackend {
            roll_forward_fails: true,
            ..Default::default()
        };
        let outcome = txn.commit(&mut backend).unwrap();
        assert_eq!(outcome, Outcome::RollForwardAbandoned);
    }

    #[test]
    fn cannot_commit_twice() {
        let mut txn = Transaction::new(4);
        let mut backend = FakeBackend::default();
        txn.commit(&mut backend).unwrap();
        let err = txn.commit(&mut backend).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TxnAlreadyCommitted);
    }

    #[test]
    fn abort_skips_verify() {
        let mut txn = Transaction::new(5);
        let mut backend = FakeBackend {
            verify_fails: true,
            ..Default::default()
        };
        let outcome = txn.abort(&mut backend).unwrap();
        assert_eq!(outcome, Outcome::Aborted);
        assert_eq!(txn.state(), State::Aborted);
    }
}

