//! Scripted two-user conversation.

use anyhow::{Context, Result};
use std::time::Duration;

use duet_client::{EngineConfig, MemoryBackend, Session};
use duet_core::{Delivery, MessageLog};
use duet_types::{Connection, Profile, UserId};

/// Give spawned pumps time to drain their queues.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Run the demo command.
pub async fn run(config: EngineConfig) -> Result<()> {
    let backend = MemoryBackend::new();
    backend.add_connection(Connection::accepted(
        Profile::new("alice", "Alice"),
        Profile::new("bob", "Bob"),
    ));
    backend.add_connection(Connection::accepted(
        Profile::new("carol", "Carol"),
        Profile::new("alice", "Alice"),
    ));

    let alice_id = UserId::from("alice");
    let bob_id = UserId::from("bob");

    let mut alice = Session::start(config.clone(), backend.clone(), alice_id.clone())
        .await
        .context("Failed to start alice's session")?;
    let mut bob = Session::start(config, backend.clone(), bob_id.clone())
        .await
        .context("Failed to start bob's session")?;
    settle().await;

    println!("=== duet demo ===");
    println!();
    println!("Alice's partners:");
    for profile in alice.partners().await {
        let status = if alice.is_online(&profile.id) {
            "online"
        } else {
            "offline"
        };
        println!("  {} ({}) - {}", profile.display_name, profile.id, status);
    }
    println!();

    // Bob writes while alice is elsewhere
    bob.open_conversation(alice_id.clone()).await;
    bob.send("hey alice, you there?", None);
    bob.send("got a minute?", None);
    settle().await;
    println!(
        "Unread from bob before opening: {}",
        alice.unread().borrow().get(&bob_id)
    );

    alice.open_conversation(bob_id.clone()).await;
    println!(
        "Unread from bob after opening:  {}",
        alice.unread().borrow().get(&bob_id)
    );
    println!();

    bob.keystroke().await;
    settle().await;
    println!("Bob is typing: {}", *alice.typing_visible().borrow());

    bob.send("ok, one more thing", None);
    settle().await;
    println!("Bob is typing: {}", *alice.typing_visible().borrow());
    println!();

    alice.send("sure, what's up?", None);
    settle().await;

    if let Some(log) = alice.log() {
        print_log("Alice's conversation with bob", &log.borrow());
    }

    bob.shutdown().await;
    settle().await;
    println!(
        "Online after bob leaves: {}",
        alice
            .online()
            .borrow()
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    alice.shutdown().await;
    Ok(())
}

fn print_log(title: &str, log: &MessageLog) {
    println!("{}:", title);
    for entry in log.entries() {
        let message = &entry.message;
        let state = match entry.delivery {
            Delivery::Sending => "sending",
            Delivery::Failed => "failed",
            Delivery::Sent if message.is_unread() => "sent",
            Delivery::Sent => "read",
        };
        println!(
            "  [{:>7}] {:>5}: {}",
            state, message.sender_id, message.content
        );
    }
    println!();
}
