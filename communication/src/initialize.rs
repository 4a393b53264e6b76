//! Spawning a rank's worth of transport and running a user closure on it:
//! a `Configuration` / `initialize` pair.

use std::sync::Arc;
use std::thread;

use crate::rpc::{Engine, LandingZone};
use crate::transport::{Process, Thread};

/// Ways to assemble the communication infrastructure for a run.
pub enum Configuration {
    /// One rank, in the calling thread's process.
    Thread,
    /// One process, `usize` ranks, each on its own thread.
    Process(usize),
    /// Multiple processes; not implemented by the reference transports.
    ///
    /// A real backend would connect this to the physical transport (TCP,
    /// RDMA verbs); this variant exists so callers can express the intent
    /// without this crate having to pretend it has a network stack.
    Cluster {
        /// Ranks per process.
        threads: usize,
        /// This process's index among `processes`.
        process: usize,
        /// Total number of processes.
        processes: usize,
    },
}

impl Configuration {
    /// Builds the per-rank engines this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns an error for [`Configuration::Cluster`]: multi-process runs
    /// need a real transport, which this crate does not provide.
    pub fn try_build(self, zone: LandingZone) -> Result<Vec<Engine<Process>>, String> {
        match self {
            Configuration::Thread => {
                Err("use Configuration::Process(1) for a single-rank in-process engine; \
                     Thread's own reference transport has no Engine wrapper"
                    .to_string())
            }
            Configuration::Process(ranks) => Ok(Process::new_vector(ranks).into_iter().map(|t| Engine::new(t, zone)).collect()),
            Configuration::Cluster { .. } => Err("Cluster configuration requires a real transport backend, not provided here".to_string()),
        }
    }
}

/// Runs `func` once per rank described by `config`, on its own OS thread,
/// and collects the results.
pub fn initialize<T, F>(config: Configuration, zone: LandingZone, func: F) -> Result<WorkerGuards<T>, String>
where
    T: Send + 'static,
    F: Fn(Engine<Process>) -> T + Send + Sync + 'static,
{
    let engines = config.try_build(zone)?;
    initialize_from(engines, func)
}

/// Runs `func` once per already-built engine, on its own OS thread.
pub fn initialize_from<T, F>(engines: Vec<Engine<Process>>, func: F) -> Result<WorkerGuards<T>, String>
where
    T: Send + 'static,
    F: Fn(Engine<Process>) -> T + Send + Sync + 'static,
{
    let logic = Arc::new(func);
    let mut guards = Vec::new();
    for (index, engine) in engines.into_iter().enumerate() {
        let logic = logic.clone();
        let handle = thread::Builder::new()
            .name(format!("pgas-rank-{index}"))
            .spawn(move || (*logic)(engine))
            .map_err(|e| format!("{e:?}"))?;
        guards.push(handle);
    }
    Ok(WorkerGuards { guards })
}

/// Runs `func` on a single in-process rank (the `Thread` transport), with
/// no background threads spawned.
pub fn initialize_single<T>(zone: LandingZone, func: impl FnOnce(Engine<Thread>) -> T) -> T {
    func(Engine::new(Thread::new(), zone))
}

/// Join handles for a run's worker threads.
pub struct WorkerGuards<T: Send + 'static> {
    guards: Vec<thread::JoinHandle<T>>,
}

impl<T: Send + 'static> WorkerGuards<T> {
    /// Waits for every rank's thread and collects its result.
    pub fn join(self) -> Vec<Result<T, String>> {
        self.guards.into_iter().map(|g| g.join().map_err(|e| format!("{e:?}"))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{self, Cleanup, Command};
    use crate::rpc::Dispatch;
    use pgas_serialize::{to_bytes, Reader, Serializable};
    use std::sync::atomic::{AtomicU32, Ordering};

    static SUM: AtomicU32 = AtomicU32::new(0);

    fn add(reader: &mut Reader<'_>) {
        let value = u32::deserialize(reader).expect("well-formed u32 argument");
        SUM.fetch_add(value, Ordering::SeqCst);
    }

    #[test]
    fn single_rank_engine_runs_locally_dispatched_commands() {
        initialize_single(LandingZone::Small, |mut engine| {
            let index = command::register(add);
            let command = Command::new(index, Cleanup::FreeBuffer, to_bytes(&5u32));
            engine.send(0, Dispatch::Restricted, command);
            let delivered = engine.poll();
            assert_eq!(delivered.len(), 1);
            delivered[0].command.dispatch();
        });
        assert_eq!(SUM.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn two_process_ranks_exchange_a_command() {
        let engines = Configuration::Process(2).try_build(LandingZone::Small).unwrap();
        let guards = initialize_from(engines, |mut engine| {
            if engine.rank() == 0 {
                let index = command::register(add);
                let command = Command::new(index, Cleanup::FreeBuffer, to_bytes(&11u32));
                engine.send(1, Dispatch::Restricted, command);
                0u32
            } else {
                loop {
                    let delivered = engine.poll();
                    if !delivered.is_empty() {
                        for d in delivered {
                            d.command.dispatch();
                        }
                        return 1u32;
                    }
                    std::thread::yield_now();
                }
            }
        })
        .unwrap();
        let results = guards.join();
        assert_eq!(results.len(), 2);
    }
}
