use std::error::Error;
use std::time::Duration;

use chrono::Utc;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;

use crate::common::types::presence_bytes;
use crate::common::{
    ControlPayload, GroupRecord, NetworkCommand, NetworkEvent, PresencePayload, SessionPayload,
    Status,
};
use crate::config::AppConfig;
use crate::error::ChatError;
use crate::state::sessions::SessionEntry;
use crate::state::{GroupRegistry, PresenceTracker, RequestOutcome, SessionNegotiator};

use super::topics::{self, InboundTopic};

/// The node engine: owns the MQTT connection and every piece of mutable
/// state (presence, pending requests, groups, session logs).
///
/// Single writer by construction. Console input arrives as commands on a
/// channel, broker traffic through the event loop, and both are handled
/// to completion on one task, so none of the maps need locking. Each
/// inbound event mutates state and emits its notification before the next
/// one is polled.
pub struct ChatEngine {
    self_id: String,
    config: AppConfig,
    event_tx: mpsc::Sender<NetworkEvent>,
    cmd_rx: mpsc::Receiver<NetworkCommand>,
    presence: PresenceTracker,
    sessions: SessionNegotiator,
    groups: GroupRegistry,
    /// Session the console is currently viewing; only its inbound lines
    /// get a live notification.
    focused: Option<String>,
}

impl ChatEngine {
    pub fn new(
        self_id: String,
        config: AppConfig,
        event_tx: mpsc::Sender<NetworkEvent>,
        cmd_rx: mpsc::Receiver<NetworkCommand>,
    ) -> Self {
        let sessions = SessionNegotiator::new(self_id.clone());
        let groups = GroupRegistry::new(self_id.clone());
        Self {
            self_id,
            config,
            event_tx,
            cmd_rx,
            presence: PresenceTracker::new(),
            sessions,
            groups,
            focused: None,
        }
    }

    /// Connect and run until a Shutdown command (or a closed command
    /// channel) completes the offline sequence.
    ///
    /// The first connection failure is fatal. Once a session has been
    /// established, poll errors are logged and polling continues; rumqttc
    /// owns the reconnect policy.
    pub async fn run(mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut options = MqttOptions::new(
            self.self_id.clone(),
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        // The will mirrors the graceful offline announce exactly, so both
        // exit paths converge to the same retained presence state.
        options.set_last_will(LastWill::new(
            topics::presence(&self.self_id),
            presence_bytes(&self.self_id, Status::Offline),
            QoS::AtLeastOnce,
            true,
        ));

        let (client, mut event_loop) = AsyncClient::new(options, 64);
        let mut connected_once = false;

        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => {
                    match command {
                        Some(NetworkCommand::Shutdown) | None => {
                            self.shutdown(&client, &mut event_loop).await;
                            break;
                        }
                        Some(command) => self.handle_command(command, &client).await,
                    }
                }
                event = event_loop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            connected_once = true;
                            self.on_connected(&client).await;
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.handle_publish(&publish.topic, &publish.payload, &client)
                                .await;
                        }
                        Ok(_) => {}
                        Err(err) if !connected_once => {
                            return Err(Box::new(err));
                        }
                        Err(err) => {
                            log::warn!("Connection error, retrying: {err}");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn on_connected(&mut self, client: &AsyncClient) {
        log::info!("Connected to broker as {}", self.self_id);

        let subs = [
            topics::presence_wildcard(),
            topics::control(&self.self_id),
            topics::groups_wildcard(),
        ];
        for topic in subs {
            if let Err(err) = client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                log::warn!("Subscribe to {topic} failed: {err}");
            }
        }
        // On a reconnect, session topics have to be re-subscribed too.
        for session in self.sessions.sessions() {
            if let Err(err) = client
                .subscribe(session.chat_id.clone(), QoS::AtLeastOnce)
                .await
            {
                log::warn!("Subscribe to {} failed: {err}", session.chat_id);
            }
        }

        if let Err(err) = client
            .publish(
                topics::presence(&self.self_id),
                QoS::AtLeastOnce,
                true,
                presence_bytes(&self.self_id, Status::Online),
            )
            .await
        {
            log::warn!("Presence announce failed: {err}");
        }
    }

    /// Graceful exit: retained offline announce, grace delay for delivery,
    /// then disconnect. Mirrors the registered last will byte for byte.
    ///
    /// `AsyncClient` calls only enqueue requests; nothing hits the socket
    /// unless the event loop keeps being polled. So the grace window and
    /// the disconnect are both driven through `event_loop` here, otherwise
    /// the broker sees an abrupt drop and fires the last will instead.
    async fn shutdown(&mut self, client: &AsyncClient, event_loop: &mut EventLoop) {
        log::info!("Shutting down, announcing offline presence");
        if let Err(err) = client
            .publish(
                topics::presence(&self.self_id),
                QoS::AtLeastOnce,
                true,
                presence_bytes(&self.self_id, Status::Offline),
            )
            .await
        {
            log::warn!("Offline announce failed: {err}");
        }

        let grace = tokio::time::sleep(Duration::from_millis(self.config.shutdown_grace_millis));
        tokio::pin!(grace);
        loop {
            tokio::select! {
                _ = &mut grace => break,
                event = event_loop.poll() => {
                    if let Err(err) = event {
                        log::warn!("Connection lost during shutdown: {err}");
                        return;
                    }
                }
            }
        }

        if let Err(err) = client.disconnect().await {
            log::warn!("Disconnect failed: {err}");
        }
        // Keep polling until the DISCONNECT packet is written out; bounded,
        // since the loop would otherwise start reconnecting.
        let flushed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            log::warn!("Timed out flushing the disconnect");
        }
    }

    async fn handle_command(&mut self, command: NetworkCommand, client: &AsyncClient) {
        if let Err(err) = self.dispatch_command(command, client).await {
            self.emit(NetworkEvent::ActionFailed(err.to_string())).await;
        }
    }

    async fn dispatch_command(
        &mut self,
        command: NetworkCommand,
        client: &AsyncClient,
    ) -> Result<(), ChatError> {
        match command {
            NetworkCommand::ListPeers => {
                let peers = self
                    .presence
                    .all()
                    .map(|(peer, status)| (peer.to_string(), status))
                    .collect();
                self.emit(NetworkEvent::PeerList(peers)).await;
            }
            NetworkCommand::RequestChat { target } => {
                self.sessions.validate_target(&target)?;
                let payload = ControlPayload::Private {
                    sender: self.self_id.clone(),
                };
                self.publish_control(&target, &payload, client).await?;
                self.emit(NetworkEvent::Notice(format!("Chat request sent to {target}")))
                    .await;
            }
            NetworkCommand::ListChatRequests => {
                self.emit(NetworkEvent::ChatRequestList(
                    self.sessions.pending().to_vec(),
                ))
                .await;
            }
            NetworkCommand::AcceptChatRequest { index } => {
                let (requester, chat_id) = self.sessions.accept(index)?;
                let payload = ControlPayload::ChatConfirmation {
                    sender: self.self_id.clone(),
                    chat_id: chat_id.clone(),
                };
                self.publish_control(&requester, &payload, client).await?;
                self.subscribe_session(&chat_id, client).await;
                self.emit(NetworkEvent::SessionEstablished {
                    chat_id,
                    peer: requester,
                })
                .await;
            }
            NetworkCommand::ListSessions => {
                let list = self
                    .sessions
                    .sessions()
                    .iter()
                    .map(|s| s.chat_id.clone())
                    .collect();
                self.emit(NetworkEvent::SessionList(list)).await;
            }
            NetworkCommand::FocusSession { chat_id } => {
                if !self.sessions.is_session(&chat_id) {
                    return Err(ChatError::InvalidInput(format!(
                        "no open session '{chat_id}'"
                    )));
                }
                self.emit(NetworkEvent::SessionFocused {
                    chat_id: chat_id.clone(),
                })
                .await;
                // Replay the log so the console can render the backlog.
                if let Some(session) = self.sessions.session(&chat_id) {
                    for entry in &session.log {
                        self.event_tx
                            .send(NetworkEvent::SessionMessage {
                                chat_id: chat_id.clone(),
                                sender: entry.sender.clone(),
                                text: entry.text.clone(),
                            })
                            .await
                            .ok();
                    }
                }
                self.focused = Some(chat_id);
            }
            NetworkCommand::UnfocusSession => {
                self.focused = None;
            }
            NetworkCommand::SendChatMessage { chat_id, text } => {
                let now = Utc::now().timestamp_millis();
                let payload = self.sessions.compose(&chat_id, &text, now)?;
                self.publish_json(&chat_id, &payload, false, client).await?;
            }
            NetworkCommand::CreateGroup { name } => {
                let record = self.groups.create(&name)?;
                self.publish_group(&record, client).await?;
                self.emit(NetworkEvent::Notice(format!("Group '{name}' created")))
                    .await;
            }
            NetworkCommand::ListGroups => {
                self.emit(NetworkEvent::GroupList(
                    self.groups.list().cloned().collect(),
                ))
                .await;
            }
            NetworkCommand::RequestJoinGroup { name } => {
                let leader = self.groups.leader_of(&name)?.to_string();
                if leader == self.self_id {
                    return Err(ChatError::InvalidInput(format!(
                        "you are the leader of '{name}'"
                    )));
                }
                let payload = ControlPayload::GroupJoinRequest {
                    sender: self.self_id.clone(),
                    group_name: name.clone(),
                };
                self.publish_control(&leader, &payload, client).await?;
                self.emit(NetworkEvent::Notice(format!(
                    "Join request for '{name}' sent to {leader}"
                )))
                .await;
            }
            NetworkCommand::ListJoinRequests => {
                self.emit(NetworkEvent::JoinRequestList(
                    self.groups.join_requests().to_vec(),
                ))
                .await;
            }
            NetworkCommand::AcceptJoinRequest { index } => {
                let request = self.groups.take_join_request(index)?;
                let record = self
                    .groups
                    .add_member(&request.group_name, &request.sender)?;
                self.publish_group(&record, client).await?;
                self.emit(NetworkEvent::Notice(format!(
                    "Added {} to '{}'",
                    request.sender, request.group_name
                )))
                .await;
            }
            NetworkCommand::AddGroupMember { group, member } => {
                let record = self.groups.add_member(&group, &member)?;
                self.publish_group(&record, client).await?;
                self.emit(NetworkEvent::Notice(format!(
                    "Added {member} to '{group}'"
                )))
                .await;
            }
            // Intercepted by the run loop before dispatch.
            NetworkCommand::Shutdown => {}
        }
        Ok(())
    }

    async fn handle_publish(&mut self, topic: &str, payload: &[u8], client: &AsyncClient) {
        // An empty payload on a retained topic is the broker's deletion
        // tombstone, never valid JSON.
        if payload.is_empty() {
            log::debug!("Ignoring retained tombstone on {topic}");
            return;
        }

        match topics::classify(topic, &self.self_id) {
            InboundTopic::Presence(_) => self.handle_presence(topic, payload).await,
            InboundTopic::Group(_) => self.handle_group_record(topic, payload).await,
            InboundTopic::Control => self.handle_control(topic, payload, client).await,
            InboundTopic::Other(topic) => self.handle_session_line(topic, payload).await,
        }
    }

    async fn handle_presence(&mut self, topic: &str, payload: &[u8]) {
        let Ok(presence) = serde_json::from_slice::<PresencePayload>(payload) else {
            log::warn!("Malformed presence payload on {topic}, dropping");
            return;
        };
        self.presence.record(&presence.user, presence.status);
        self.emit(NetworkEvent::PresenceChanged {
            peer: presence.user,
            status: presence.status,
        })
        .await;
    }

    async fn handle_group_record(&mut self, topic: &str, payload: &[u8]) {
        let Ok(record) = serde_json::from_slice::<GroupRecord>(payload) else {
            log::warn!("Malformed group record on {topic}, dropping");
            return;
        };
        if !record.is_valid() {
            log::warn!("Incomplete group record on {topic}, dropping");
            return;
        }
        self.groups.update_local(record.clone());
        self.emit(NetworkEvent::GroupUpdated(record)).await;
    }

    async fn handle_control(&mut self, topic: &str, payload: &[u8], client: &AsyncClient) {
        let Ok(control) = serde_json::from_slice::<ControlPayload>(payload) else {
            log::warn!("Malformed control payload on {topic}, dropping");
            return;
        };
        let now = Utc::now().timestamp_millis();

        match control {
            ControlPayload::Private { sender } => {
                let outcome = self.sessions.record_request(&sender, now);
                self.emit(NetworkEvent::ChatRequestReceived {
                    sender,
                    refreshed: outcome == RequestOutcome::Refreshed,
                })
                .await;
            }
            ControlPayload::ChatConfirmation { sender, chat_id } => {
                // The accepter computed the id; adopt it verbatim.
                self.sessions.open_session(&chat_id, &sender);
                self.subscribe_session(&chat_id, client).await;
                self.emit(NetworkEvent::SessionEstablished {
                    chat_id,
                    peer: sender,
                })
                .await;
            }
            ControlPayload::GroupJoinRequest { sender, group_name } => {
                let outcome = self.groups.record_join_request(&sender, &group_name, now);
                self.emit(NetworkEvent::JoinRequestReceived {
                    sender,
                    group: group_name,
                    refreshed: outcome == RequestOutcome::Refreshed,
                })
                .await;
            }
        }
    }

    async fn handle_session_line(&mut self, topic: &str, payload: &[u8]) {
        if !self.sessions.is_session(topic) {
            log::debug!("Publish on unknown topic {topic}, ignoring");
            return;
        }
        let Ok(line) = serde_json::from_slice::<SessionPayload>(payload) else {
            log::warn!("Malformed session payload on {topic}, dropping");
            return;
        };
        // Our own lines were appended at compose time; this is the broker
        // echoing them back to a subscriber of the same topic.
        if line.sender == self.self_id {
            return;
        }
        self.sessions.append(topic, SessionEntry {
            sender: line.sender.clone(),
            text: line.text.clone(),
            sent_at: line.sent_at,
        });
        if self.focused.as_deref() == Some(topic) {
            self.emit(NetworkEvent::SessionMessage {
                chat_id: topic.to_string(),
                sender: line.sender,
                text: line.text,
            })
            .await;
        }
    }

    async fn subscribe_session(&mut self, chat_id: &str, client: &AsyncClient) {
        if let Err(err) = client.subscribe(chat_id.to_string(), QoS::AtLeastOnce).await {
            log::warn!("Subscribe to session {chat_id} failed: {err}");
        }
    }

    async fn publish_control(
        &mut self,
        peer: &str,
        payload: &ControlPayload,
        client: &AsyncClient,
    ) -> Result<(), ChatError> {
        self.publish_json(&topics::control(peer), payload, false, client)
            .await
    }

    async fn publish_group(
        &mut self,
        record: &GroupRecord,
        client: &AsyncClient,
    ) -> Result<(), ChatError> {
        self.publish_json(&topics::group(&record.group_name), record, true, client)
            .await
    }

    async fn publish_json<T: serde::Serialize>(
        &mut self,
        topic: &str,
        payload: &T,
        retain: bool,
        client: &AsyncClient,
    ) -> Result<(), ChatError> {
        let bytes =
            serde_json::to_vec(payload).map_err(|err| ChatError::Transport(err.to_string()))?;
        client
            .publish(topic.to_string(), QoS::AtLeastOnce, retain, bytes)
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))
    }

    async fn emit(&self, event: NetworkEvent) {
        if let Err(err) = self.event_tx.send(event).await {
            log::warn!("Console channel closed: {err}");
        }
    }
}
