// Session group fan-out.
//
// Each connected client registers an unbounded sender; a writer task on
// the socket side drains it. Sends are fire-and-forget: the engine never
// blocks round progression on delivery, and a dead receiver just drops
// out of the group on its next registration or disconnect.

use maplive_common::protocol::ws::LiveMessage;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct BroadcastGroup {
    presenter: Option<mpsc::UnboundedSender<LiveMessage>>,
    members: HashMap<Uuid, mpsc::UnboundedSender<LiveMessage>>,
}

impl BroadcastGroup {
    pub fn register_presenter(&mut self, sender: mpsc::UnboundedSender<LiveMessage>) {
        self.presenter = Some(sender);
    }

    pub fn unregister_presenter(&mut self) {
        self.presenter = None;
    }

    pub fn register_member(&mut self, participant_id: Uuid, sender: mpsc::UnboundedSender<LiveMessage>) {
        self.members.insert(participant_id, sender);
    }

    pub fn unregister_member(&mut self, participant_id: Uuid) {
        self.members.remove(&participant_id);
    }

    /// Send to every group member plus the presenter. Returns the number
    /// of sends that reached a live receiver.
    pub fn broadcast(&self, message: &LiveMessage) -> usize {
        let mut sent = 0;
        if let Some(presenter) = &self.presenter {
            if presenter.send(message.clone()).is_ok() {
                sent += 1;
            }
        }
        for sender in self.members.values() {
            if sender.send(message.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Send to a single participant. Answer feedback goes through here so
    /// other participants never learn the answer mid-round.
    pub fn send_to(&self, participant_id: Uuid, message: LiveMessage) -> bool {
        self.members
            .get(&participant_id)
            .map(|sender| sender.send(message).is_ok())
            .unwrap_or(false)
    }

    /// Send to the presenter only.
    pub fn send_to_presenter(&self, message: LiveMessage) -> bool {
        self.presenter.as_ref().map(|sender| sender.send(message).is_ok()).unwrap_or(false)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presenter.is_none() && self.members.is_empty()
    }
}
