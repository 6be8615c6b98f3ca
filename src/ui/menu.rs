use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::common::{NetworkCommand, NetworkEvent, Status};

/// What the next stdin line means.
#[derive(Debug, Clone)]
enum Prompt {
    Menu,
    ChatTarget,
    AcceptChatIndex,
    SessionPick,
    /// Focused on a session: lines are chat messages until `/back`.
    InSession { chat_id: String },
    GroupName,
    JoinGroupName,
    AcceptJoinIndex,
    AddMemberGroup,
    AddMemberName { group: String },
}

/// Thin console surface: one prompt state machine over stdin lines,
/// interleaved with notifications from the engine.
///
/// The select below is what keeps notifications live while a prompt is
/// outstanding; the engine never waits on the console.
pub struct ConsoleMenu {
    self_id: String,
    cmd_tx: mpsc::Sender<NetworkCommand>,
    event_rx: mpsc::Receiver<NetworkEvent>,
}

impl ConsoleMenu {
    pub fn new(
        self_id: String,
        cmd_tx: mpsc::Sender<NetworkCommand>,
        event_rx: mpsc::Receiver<NetworkEvent>,
    ) -> Self {
        Self {
            self_id,
            cmd_tx,
            event_rx,
        }
    }

    pub async fn run(mut self) {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut prompt = Prompt::Menu;

        println!("KidConnect, connected as {}", self.self_id);
        print_menu();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Ok(Some(line)) = line else { break };
                    let line = line.trim().to_string();
                    if !self.handle_line(&mut prompt, line).await {
                        break;
                    }
                }
                event = self.event_rx.recv() => {
                    let Some(event) = event else { break };
                    handle_event(event, &mut prompt);
                }
            }
        }

        let _ = self.cmd_tx.send(NetworkCommand::Shutdown).await;
    }

    /// Returns false when the user chose to quit.
    async fn handle_line(&mut self, prompt: &mut Prompt, line: String) -> bool {
        match prompt.clone() {
            Prompt::Menu => return self.handle_menu_choice(prompt, &line).await,
            Prompt::ChatTarget => {
                self.send(NetworkCommand::RequestChat { target: line }).await;
                *prompt = Prompt::Menu;
            }
            Prompt::AcceptChatIndex => {
                match line.parse::<usize>() {
                    Ok(index) => {
                        self.send(NetworkCommand::AcceptChatRequest { index }).await;
                    }
                    Err(_) => println!("Not a number: {line}"),
                }
                *prompt = Prompt::Menu;
            }
            Prompt::SessionPick => {
                // The engine confirms with SessionFocused (or rejects with
                // ActionFailed); only the confirmation enters the session
                // view, so a typo leaves us on the menu.
                self.send(NetworkCommand::FocusSession { chat_id: line }).await;
                *prompt = Prompt::Menu;
            }
            Prompt::InSession { chat_id } => {
                if line == "/back" {
                    self.send(NetworkCommand::UnfocusSession).await;
                    *prompt = Prompt::Menu;
                    print_menu();
                } else {
                    self.send(NetworkCommand::SendChatMessage {
                        chat_id,
                        text: line,
                    })
                    .await;
                }
                return true;
            }
            Prompt::GroupName => {
                self.send(NetworkCommand::CreateGroup { name: line }).await;
                *prompt = Prompt::Menu;
            }
            Prompt::JoinGroupName => {
                self.send(NetworkCommand::RequestJoinGroup { name: line }).await;
                *prompt = Prompt::Menu;
            }
            Prompt::AcceptJoinIndex => {
                match line.parse::<usize>() {
                    Ok(index) => {
                        self.send(NetworkCommand::AcceptJoinRequest { index }).await;
                    }
                    Err(_) => println!("Not a number: {line}"),
                }
                *prompt = Prompt::Menu;
            }
            Prompt::AddMemberGroup => {
                *prompt = Prompt::AddMemberName { group: line };
                println!("Peer id to add:");
                return true;
            }
            Prompt::AddMemberName { group } => {
                self.send(NetworkCommand::AddGroupMember {
                    group,
                    member: line,
                })
                .await;
                *prompt = Prompt::Menu;
            }
        }
        true
    }

    async fn handle_menu_choice(&mut self, prompt: &mut Prompt, choice: &str) -> bool {
        match choice {
            "1" => self.send(NetworkCommand::ListPeers).await,
            "2" => {
                println!("Peer id to chat with:");
                *prompt = Prompt::ChatTarget;
            }
            "3" => self.send(NetworkCommand::ListChatRequests).await,
            "4" => {
                println!("Request number to accept:");
                *prompt = Prompt::AcceptChatIndex;
            }
            "5" => self.send(NetworkCommand::ListSessions).await,
            "6" => {
                println!("Session topic to open:");
                *prompt = Prompt::SessionPick;
            }
            "7" => {
                println!("New group name:");
                *prompt = Prompt::GroupName;
            }
            "8" => self.send(NetworkCommand::ListGroups).await,
            "9" => {
                println!("Group name to join:");
                *prompt = Prompt::JoinGroupName;
            }
            "10" => self.send(NetworkCommand::ListJoinRequests).await,
            "11" => {
                println!("Join request number to accept:");
                *prompt = Prompt::AcceptJoinIndex;
            }
            "12" => {
                println!("Group name:");
                *prompt = Prompt::AddMemberGroup;
            }
            "0" => return false,
            "" => {}
            other => {
                println!("Unknown option: {other}");
                print_menu();
            }
        }
        true
    }

    async fn send(&self, command: NetworkCommand) {
        if self.cmd_tx.send(command).await.is_err() {
            log::warn!("Engine channel closed");
        }
    }
}

fn print_menu() {
    println!("\nMenu KidConnect");
    println!(" 1 - List users");
    println!(" 2 - Request a chat");
    println!(" 3 - List pending chat requests");
    println!(" 4 - Accept a chat request");
    println!(" 5 - List open sessions");
    println!(" 6 - Open a session");
    println!(" 7 - Create a group");
    println!(" 8 - List groups");
    println!(" 9 - Request to join a group");
    println!("10 - List pending join requests");
    println!("11 - Accept a join request");
    println!("12 - Add a member to a group");
    println!(" 0 - Quit");
    println!("Choose an option:");
}

fn handle_event(event: NetworkEvent, prompt: &mut Prompt) {
    if let NetworkEvent::SessionFocused { chat_id } = event {
        println!("-- session {chat_id}; type /back to return to the menu --");
        *prompt = Prompt::InSession { chat_id };
        return;
    }
    render_event(&event);
}

fn render_event(event: &NetworkEvent) {
    match event {
        NetworkEvent::PresenceChanged { peer, status } => {
            println!("* {peer} is {status}");
        }
        NetworkEvent::PeerList(peers) => {
            if peers.is_empty() {
                println!("No users seen yet.");
            }
            for (peer, status) in peers {
                let marker = match status {
                    Status::Online => "+",
                    Status::Offline => "-",
                };
                println!(" {marker} {peer} ({status})");
            }
        }
        NetworkEvent::ChatRequestReceived { sender, refreshed } => {
            if *refreshed {
                println!("* {sender} asked again to chat (request refreshed)");
            } else {
                println!("* {sender} wants to chat (accept via the menu)");
            }
        }
        NetworkEvent::ChatRequestList(requests) => {
            if requests.is_empty() {
                println!("No pending chat requests.");
            }
            for (i, request) in requests.iter().enumerate() {
                println!(" {} - from {}", i + 1, request.sender);
            }
        }
        NetworkEvent::SessionEstablished { chat_id, peer } => {
            println!("* Session with {peer} open: {chat_id}");
        }
        // Consumed by handle_event; it switches the prompt state.
        NetworkEvent::SessionFocused { .. } => {}
        NetworkEvent::SessionList(sessions) => {
            if sessions.is_empty() {
                println!("No open sessions.");
            }
            for chat_id in sessions {
                println!(" - {chat_id}");
            }
        }
        NetworkEvent::SessionMessage { sender, text, .. } => {
            println!("[{sender}] {text}");
        }
        NetworkEvent::GroupUpdated(record) => {
            println!(
                "* Group '{}' updated ({} members)",
                record.group_name,
                record.members.len()
            );
        }
        NetworkEvent::GroupList(groups) => {
            if groups.is_empty() {
                println!("No groups known.");
            }
            for group in groups {
                println!(
                    " - {} (leader {}; members: {})",
                    group.group_name,
                    group.leader,
                    group.members.join(", ")
                );
            }
        }
        NetworkEvent::JoinRequestReceived {
            sender,
            group,
            refreshed,
        } => {
            if *refreshed {
                println!("* {sender} asked again to join '{group}'");
            } else {
                println!("* {sender} wants to join '{group}'");
            }
        }
        NetworkEvent::JoinRequestList(requests) => {
            if requests.is_empty() {
                println!("No pending join requests.");
            }
            for (i, request) in requests.iter().enumerate() {
                println!(
                    " {} - {} wants to join '{}'",
                    i + 1,
                    request.sender,
                    request.group_name
                );
            }
        }
        NetworkEvent::Notice(text) => println!("[ok] {text}"),
        NetworkEvent::ActionFailed(text) => println!("[error] {text}"),
    }
}
