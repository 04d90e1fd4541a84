use std::{
    sync::{
        atomic::{AtomicU16, Ordering},
        mpsc, Arc, RwLock,
    },
    thread::sleep,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rand::random;
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    eid::Eid,
    ideas::{self, IdeaQuery},
    storage::{self, StorageManager},
    users,
    vector::VectorSearchService,
};

pub fn now() -> u128 {
    let start = SystemTime::now();
    let since_the_epoch = start
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards");
    since_the_epoch.as_millis()
}

pub fn throttle(counter: Arc<AtomicU16>, config: Arc<RwLock<Config>>) {
    while counter.load(Ordering::Relaxed)
        >= config
            .read()
            .expect("config lock poisoned")
            .task_queue_max_threads
    {
        sleep(Duration::from_millis(100));
    }
}

pub fn start_queue(
    task_rx: mpsc::Receiver<Task>,
    idea_mgr: Arc<dyn ideas::IdeaManager>,
    user_store: Arc<dyn users::UserStore>,
    vector: Arc<VectorSearchService>,
    config: Arc<RwLock<Config>>,
) {
    let thread_ctr = Arc::new(AtomicU16::new(0));

    log::debug!("waiting for job");
    while let Ok(task) = task_rx.recv() {
        log::debug!("got the job");
        let idea_mgr = idea_mgr.clone();
        let user_store = user_store.clone();
        let vector = vector.clone();
        let thread_counter = thread_ctr.clone();

        let config = config.clone();

        // graceful shutdown
        if let Task::Shutdown = &task {
            log::info!("{}", thread_counter.load(Ordering::Relaxed));
            while thread_counter.load(Ordering::Relaxed) > 0 {
                sleep(Duration::from_millis(100));
            }
            return;
        };

        let id = save_task(task.clone(), Status::Pending);
        let task_handle = std::thread::spawn({
            let thread_counter = thread_counter.clone();
            let id = id.clone();
            move || {
                throttle(thread_counter.clone(), config.clone());

                thread_counter.fetch_add(1, Ordering::Relaxed);
                set_status(id.clone(), Status::InProgress);

                let max_retries = config
                    .read()
                    .expect("config lock poisoned")
                    .task_queue_max_retries;
                let mut attempt = 0u8;

                loop {
                    let status = task.run(idea_mgr.clone(), user_store.clone(), vector.clone());

                    match &status {
                        Status::Error(msg) if attempt < max_retries && is_retryable_error(msg) => {
                            attempt += 1;
                            let delay_ms = 5000 * 2u64.pow(attempt as u32 - 1) + rand_jitter();
                            log::info!(
                                "task {}: retrying (attempt {}/{}) after error: {}, backoff {}ms",
                                id,
                                attempt,
                                max_retries,
                                msg,
                                delay_ms
                            );
                            set_attempt(id.clone(), attempt);
                            set_status(id.clone(), Status::Pending);
                            sleep(Duration::from_millis(delay_ms));
                        }
                        _ => {
                            set_status(id.clone(), status);
                            break;
                        }
                    }
                }

                // remove task a bit later to give client an opportunity to react
                std::thread::spawn(move || {
                    sleep(Duration::from_secs(10));
                    remove_task(id);
                });
            }
        });

        // handle thread panics
        std::thread::spawn(move || {
            if let Err(err) = task_handle.join() {
                log::error!("task_handle panicked: {err:?}");
                remove_task(id);
            }

            thread_counter.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

pub fn read_queue_dump() -> QueueDump {
    let store = match storage::BackendLocal::new("./") {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to initialize queue storage: {e}");
            return QueueDump {
                queue: vec![],
                now: now(),
            };
        }
    };

    let filename = "task-queue.json";

    if store.exists(filename) {
        match store.read(filename) {
            Ok(data) => serde_json::from_slice(&data).unwrap_or_else(|e| {
                log::error!("queue dump is malformed, starting fresh: {e}");
                QueueDump {
                    queue: vec![],
                    now: now(),
                }
            }),
            Err(e) => {
                log::error!("failed to read queue dump: {e}");
                QueueDump {
                    queue: vec![],
                    now: now(),
                }
            }
        }
    } else {
        QueueDump {
            queue: vec![],
            now: now(),
        }
    }
}

pub fn write_queue_dump(queue_dump: &QueueDump) {
    let store = match storage::BackendLocal::new("./") {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to initialize queue storage: {e}");
            return;
        }
    };

    let filename = "task-queue.json";

    let queue_dump_str =
        serde_json::to_string_pretty(&queue_dump).expect("queue dump serializes");
    if let Err(e) = store.write(filename, queue_dump_str.as_bytes()) {
        log::error!("failed to write queue dump: {e}");
    }
}

pub fn remove_task(id: Eid) {
    let mut queue_dump = read_queue_dump();
    queue_dump.queue.retain(|td| td.id != id);
    queue_dump.now = now();
    write_queue_dump(&queue_dump);
}

pub fn set_status(id: Eid, status: Status) {
    let mut queue_dump = read_queue_dump();
    if let Some(task_dump) = queue_dump.queue.iter_mut().find(|td| td.id == id) {
        task_dump.status = status;
    }

    queue_dump.now = now();
    write_queue_dump(&queue_dump);
}

fn set_attempt(id: Eid, attempt: u8) {
    let mut queue_dump = read_queue_dump();
    if let Some(task_dump) = queue_dump.queue.iter_mut().find(|td| td.id == id) {
        task_dump.attempt = attempt;
    }
    queue_dump.now = now();
    write_queue_dump(&queue_dump);
}

fn is_retryable_error(msg: &str) -> bool {
    let msg_lower = msg.to_lowercase();

    let retryable = msg_lower.contains("timeout")
        || msg_lower.contains("timed out")
        || msg_lower.contains("connection")
        || msg_lower.contains("reset by peer")
        || msg_lower.contains("status 429")
        || msg_lower.contains("status 500")
        || msg_lower.contains("status 502")
        || msg_lower.contains("status 503")
        || msg_lower.contains("status 504");

    // client-side rejections are not worth retrying
    let is_client_error = msg_lower.contains("status 400")
        || msg_lower.contains("status 401")
        || msg_lower.contains("status 403")
        || msg_lower.contains("status 404")
        || msg_lower.contains("malformed");

    retryable && !is_client_error
}

fn rand_jitter() -> u64 {
    random::<u64>() % 2000
}

pub fn save_task(task: Task, status: Status) -> Eid {
    let eid = Eid::new();

    let task_dump = TaskDump {
        id: eid.clone(),
        task,
        status,
        attempt: 0,
    };

    let mut queue_dump = read_queue_dump();

    queue_dump.queue.push(task_dump);
    queue_dump.now = now();
    write_queue_dump(&queue_dump);

    eid
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Status {
    Interrupted,
    Pending,
    InProgress,
    Done,
    Error(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueDump {
    pub queue: Vec<TaskDump>,
    pub now: u128,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDump {
    pub id: Eid,
    pub task: Task,
    pub status: Status,
    #[serde(default)]
    pub attempt: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Task {
    /// request to re-embed one idea, or the whole corpus when None
    Vectorize { idea_id: Option<Eid> },

    /// request to gracefully shutdown task queue
    Shutdown,
}

impl Task {
    pub fn run(
        &self,
        idea_mgr: Arc<dyn ideas::IdeaManager>,
        user_store: Arc<dyn users::UserStore>,
        vector: Arc<VectorSearchService>,
    ) -> Status {
        match self {
            Task::Vectorize { idea_id } => {
                log::debug!("picked up a vectorize job...");

                let query = IdeaQuery {
                    id: idea_id.clone(),
                    ..Default::default()
                };

                let ideas = match idea_mgr.search(query) {
                    Ok(ideas) => ideas,
                    Err(err) => return Status::Error(err.to_string()),
                };

                if idea_id.is_some() && ideas.is_empty() {
                    return Status::Error(format!(
                        "idea {} not found",
                        idea_id.clone().expect("checked is_some")
                    ));
                }

                let founder_of = |user_id: &Eid| {
                    user_store
                        .get(user_id)
                        .map_err(|err| log::error!("founder lookup failed: {err}"))
                        .ok()
                        .flatten()
                };

                match vector.vectorize(&ideas, founder_of) {
                    Ok(report) if report.failed > 0 && report.indexed == 0 => {
                        Status::Error(format!("{} ideas failed to vectorize", report.failed))
                    }
                    Ok(_) => Status::Done,
                    Err(err) => Status::Error(err.to_string()),
                }
            }
            Task::Shutdown => unreachable!(),
        }
    }
}
