//! The checker: a single dedicated thread that verifies a torrent's
//! on-disk data against its fast-resume snapshot before handing the
//! torrent over to the reactor. Long-lived and fed by a queue, the same
//! `thread::Builder::new().name(...)` spawn style `logger::logger_receiver`
//! uses for its own background writer thread.

pub mod adler32;
pub mod job;
pub mod resume;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use logger::logger_sender::LoggerSender;

use crate::session::alert::{Alert, AlertSink};
use crate::session::SessionCore;

use self::job::CheckerJob;

struct CheckerState {
    pending: VecDeque<CheckerJob>,
    processing: VecDeque<CheckerJob>,
    abort: bool,
}

/// A cheap-to-clone handle the public façade and the checker thread both
/// hold; the condvar wakes the checker whenever `pending` gains work or
/// shutdown is requested.
#[derive(Clone)]
pub struct CheckerHandle {
    state: Arc<Mutex<CheckerState>>,
    cond: Arc<Condvar>,
}

impl CheckerHandle {
    pub fn spawn(session: Arc<Mutex<SessionCore>>, alert_sink: AlertSink, logger: LoggerSender) -> Self {
        let state = Arc::new(Mutex::new(CheckerState {
            pending: VecDeque::new(),
            processing: VecDeque::new(),
            abort: false,
        }));
        let cond = Arc::new(Condvar::new());

        let handle = Self {
            state: state.clone(),
            cond: cond.clone(),
        };

        thread::Builder::new()
            .name("checker".to_string())
            .spawn(move || run(state, cond, session, alert_sink, logger))
            .expect("failed to spawn checker thread");

        handle
    }

    pub fn enqueue(&self, job: CheckerJob) {
        let mut state = self.state.lock().expect("checker mutex poisoned");
        state.pending.push_back(job);
        self.cond.notify_one();
    }

    pub fn contains(&self, info_hash: &[u8; 20]) -> bool {
        let state = self.state.lock().expect("checker mutex poisoned");
        state.pending.iter().any(|j| &j.info_hash == info_hash)
            || state.processing.iter().any(|j| &j.info_hash == info_hash)
    }

    pub fn pending_info_hashes(&self) -> Vec<[u8; 20]> {
        let state = self.state.lock().expect("checker mutex poisoned");
        state
            .pending
            .iter()
            .chain(state.processing.iter())
            .filter(|j| !j.abort)
            .map(|j| j.info_hash)
            .collect()
    }

    /// Marks a job to stop at its next safe point: immediately if still
    /// queued, cooperatively if already `current`.
    pub fn abort(&self, info_hash: &[u8; 20]) {
        let mut state = self.state.lock().expect("checker mutex poisoned");
        if let Some(pos) = state.pending.iter().position(|j| &j.info_hash == info_hash) {
            state.pending.remove(pos);
            return;
        }
        for job in state.processing.iter_mut() {
            if &job.info_hash == info_hash {
                job.abort = true;
            }
        }
        self.cond.notify_one();
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock().expect("checker mutex poisoned");
        state.abort = true;
        if let Some(job) = state.pending.front_mut() {
            job.abort = true;
        }
        self.cond.notify_all();
    }
}

fn run(
    state: Arc<Mutex<CheckerState>>,
    cond: Arc<Condvar>,
    session: Arc<Mutex<SessionCore>>,
    alert_sink: AlertSink,
    logger: LoggerSender,
) {
    let mut current: Option<CheckerJob> = None;

    loop {
        let mut guard = state.lock().expect("checker mutex poisoned");
        while guard.pending.is_empty() && current.is_none() && !guard.abort {
            guard = cond.wait(guard).expect("checker condvar poisoned");
        }
        if guard.abort && guard.pending.is_empty() && current.is_none() {
            return;
        }

        if let Some(front) = guard.pending.front() {
            if front.abort {
                let mut job = guard.pending.pop_front().unwrap();
                drop(guard);
                if job.has_live_peers() {
                    job.torrent.abort();
                    let mut session = session.lock().expect("session mutex poisoned");
                    session.add_torrent(job.torrent);
                }
                continue;
            }
        }

        // Pop and ingest one new job, if the queue has one. This is a
        // one-shot intake step, independent of whether `current` is already
        // set: a job parked in `current` must still be stepped below even
        // when `pending` is empty (step 8 of §4.F), otherwise it never
        // finishes.
        if let Some(mut job) = guard.pending.pop_front() {
            drop(guard);

            if let Err(message) = resume::parse(&mut job) {
                alert_sink.post(Alert::FastresumeRejected {
                    info_hash: job.info_hash,
                    message,
                });
            }
            job.resume_data.clear();
            job.resume_data.shrink_to_fit();

            if job.piece_map_is_complete() {
                commit_job(job, &session, &alert_sink);
                continue;
            }

            let mut guard = state.lock().expect("checker mutex poisoned");
            job.processing = true;
            guard.processing.push_back(job);
            if current.is_none() {
                current = guard.processing.pop_front();
                if let Some(next) = current.as_mut() {
                    next.processing = true;
                }
            }
        } else {
            drop(guard);
        }

        let Some(mut job) = current.take() else {
            continue;
        };

        // `check_files` is single-shot here (no real on-disk hashing to
        // interrupt — see DESIGN.md): one commit of the fast-resume piece
        // map is the entirety of "checking" for this job, whether or not it
        // leaves the torrent fully downloaded, so every job reaching this
        // point finishes checking on its first (and only) step.
        job.torrent.pieces_mut().commit_fastresume(&job.piece_map);
        let total = job.torrent.pieces().finished_count() + job.torrent.pieces().remaining_pieces() as usize;
        job.progress = job.torrent.pieces().finished_count() as f32 / total.max(1) as f32;

        let mut guard = state.lock().expect("checker mutex poisoned");
        if job.abort {
            drop(guard);
            if job.has_live_peers() {
                job.torrent.abort();
                let mut session = session.lock().expect("session mutex poisoned");
                session.add_torrent(job.torrent);
            }
            current = state.lock().expect("checker mutex poisoned").processing.pop_front();
            if let Some(next) = current.as_mut() {
                next.processing = true;
            }
            continue;
        }

        guard.processing.retain(|j| j.info_hash != job.info_hash);
        let next = guard.processing.pop_front();
        drop(guard);
        logger.info(&format!("finished checking torrent {:?}", job.info_hash));
        commit_job(job, &session, &alert_sink);
        current = next;
        if let Some(next) = current.as_mut() {
            next.processing = true;
        }
    }
}

fn commit_job(mut job: CheckerJob, session: &Arc<Mutex<SessionCore>>, alert_sink: &AlertSink) {
    let is_seed = job.torrent.is_seed();
    let info_hash = job.info_hash;
    job.torrent.get_policy_mut().seed_from_resume(&job.peer_map);

    let mut session = session.lock().expect("session mutex poisoned");
    session.add_torrent(job.torrent);
    if is_seed {
        alert_sink.post(Alert::TorrentFinished { info_hash });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::alert::alert_channel;
    use crate::session::SessionCore;
    use crate::torrent_parser::info::Info;
    use crate::torrent_parser::torrent::Torrent as TorrentMetadata;
    use std::time::Instant;

    fn test_metadata(info_hash: [u8; 20]) -> TorrentMetadata {
        TorrentMetadata {
            announce_url: "http://example.com/announce".to_string(),
            info: Info {
                length: 20,
                name: "example".to_string(),
                piece_length: 10,
                pieces: vec![],
            },
            info_hash: info_hash.iter().map(|b| format!("{:02x}", b)).collect(),
        }
    }

    fn test_logger() -> LoggerSender {
        LoggerSender::new(std::sync::mpsc::channel().0)
    }

    fn wait_for_torrent(session: &Arc<Mutex<SessionCore>>, info_hash: &[u8; 20]) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if session
                .lock()
                .expect("session mutex poisoned")
                .torrents
                .contains_key(info_hash)
            {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "checker thread never committed the job (livelock?)"
            );
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// A job with no usable fast-resume data (every `piece_map` slot stays
    /// `-2`, the shape an empty `resume_data` produces) must still reach
    /// `session.torrents`, not get parked in `current` forever while the
    /// thread spins re-checking an empty `pending` queue.
    #[test]
    fn checker_converges_on_a_job_with_no_resume_data() {
        let (alert_sink, _alert_source) = alert_channel();
        let session = Arc::new(Mutex::new(
            SessionCore::new(alert_sink.clone(), test_logger(), false).expect("session core"),
        ));
        let handle = CheckerHandle::spawn(session.clone(), alert_sink, test_logger());

        let info_hash = [7u8; 20];
        let job = CheckerJob::new(
            info_hash,
            test_metadata(info_hash),
            "/nonexistent".to_string(),
            Vec::new(),
            true,
            16384,
        );
        handle.enqueue(job);

        wait_for_torrent(&session, &info_hash);
    }

    /// Several jobs with incomplete piece maps queued back to back must all
    /// converge, one after another through `processing`, not just the first.
    #[test]
    fn checker_converges_on_every_queued_job_in_turn() {
        let (alert_sink, _alert_source) = alert_channel();
        let session = Arc::new(Mutex::new(
            SessionCore::new(alert_sink.clone(), test_logger(), false).expect("session core"),
        ));
        let handle = CheckerHandle::spawn(session.clone(), alert_sink, test_logger());

        let hashes = [[1u8; 20], [2u8; 20], [3u8; 20]];
        for info_hash in hashes {
            let job = CheckerJob::new(
                info_hash,
                test_metadata(info_hash),
                "/nonexistent".to_string(),
                Vec::new(),
                true,
                16384,
            );
            handle.enqueue(job);
        }

        for info_hash in hashes {
            wait_for_torrent(&session, &info_hash);
        }
    }
}
