use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, PoisonError},
};

use log::{trace, warn};

use crate::ServerError;

/// Writes encoded messages to a session's socket
pub trait PacketSender: Send + Sync {
    fn send(&self, session_id: &str, text: &str) -> Result<(), String>;
}

/// Decouples request handling from socket writes. Messages are queued per
/// session in the order produced and written out by `flush`.
pub struct MessageBroker {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    flush_lock: Mutex<()>,
    sender: Box<dyn PacketSender>,
}

impl MessageBroker {
    pub fn new(sender: Box<dyn PacketSender>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            flush_lock: Mutex::new(()),
            sender,
        }
    }

    pub fn queue(&self, session_id: &str, text: String) {
        trace!("Queueing for {}: {}", session_id, text);
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .push_back(text);
    }

    pub fn pending(&self, session_id: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub fn remove_session(&self, session_id: &str) {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }

    /// Send everything queued so far, session by session in queue order.
    /// When a send fails the unsent remainder of that session's queue is put
    /// back ahead of anything queued since. Returns the number of messages
    /// sent.
    pub fn flush(&self) -> Result<usize, ServerError> {
        let _flushing = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let drained: Vec<(String, VecDeque<String>)> = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(session_id, queue)| (session_id.clone(), std::mem::take(queue)))
            .collect();

        let mut sent = 0;
        let mut failure = None;
        for (session_id, mut queue) in drained {
            while let Some(text) = queue.front() {
                if let Err(reason) = self.sender.send(&session_id, text) {
                    warn!("Send to session {} failed: {}", session_id, reason);
                    failure.get_or_insert(ServerError::Transport {
                        session_id: session_id.clone(),
                        reason,
                    });
                    break;
                }
                queue.pop_front();
                sent += 1;
            }
            if !queue.is_empty() {
                let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
                let pending = queues.entry(session_id).or_default();
                while let Some(text) = queue.pop_back() {
                    pending.push_front(text);
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(sent),
        }
    }
}
