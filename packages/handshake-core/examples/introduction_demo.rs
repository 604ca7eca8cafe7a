//! # Introduction Flow Demo
//!
//! Walks three users through discovery, a denied request and a granted one:
//! 1. Ann, Ben and Cat sign up
//! 2. Ann asks Ben and Cat for their details
//! 3. Ben declines, Cat accepts
//! 4. Ann sees Cat's contact document; Ben stays discoverable
//!
//! ## Run
//!
//! ```bash
//! cargo run --example introduction_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use handshake_core::{ContactDocument, Database, Handshake, LogSink, NotificationDispatcher};

#[tokio::main]
async fn main() {
    println!("=================================================");
    println!("          HANDSHAKE INTRODUCTION DEMO");
    println!("=================================================\n");

    let database = Arc::new(Database::open(None).expect("Failed to open in-memory database"));
    let (notifier, _worker) = NotificationDispatcher::spawn(Arc::new(LogSink));
    let handshake = Handshake::new(database, notifier);

    // =========================================================================
    // STEP 1: Sign up
    // =========================================================================
    println!("1. Signing up Ann, Ben and Cat...\n");

    for (id, first, last) in [("ann", "Ann", "Archer"), ("ben", "Ben", "Baker"), ("cat", "Cat", "Cooper")] {
        let document = ContactDocument::from_value(json!({
            "first_name": first,
            "last_name": last,
            "image": format!("https://example.com/{}.png", id),
            "phone": "+1 555 0100",
            "device_id": format!("\"{}-device-token\"", id),
        }))
        .expect("Failed to build contact document");

        handshake
            .directory
            .create_user(id, document)
            .expect("Failed to create user");
        println!("   Created {}", id);
    }
    println!();

    // =========================================================================
    // STEP 2: Ann looks around and sends requests
    // =========================================================================
    println!("2. Ann discovers users and sends requests...\n");

    for summary in handshake.visibility.list_discoverable("ann").expect("discover") {
        println!("   Discoverable: {} ({})", summary.first_name, summary.user_id);
    }

    let to_ben = handshake.ledger.create_request("ann", "ben").expect("request ben");
    let to_cat = handshake.ledger.create_request("ann", "cat").expect("request cat");
    println!("   Request to Ben: {}", to_ben);
    println!("   Request to Cat: {}", to_cat);
    println!();

    // =========================================================================
    // STEP 3: Ben and Cat answer
    // =========================================================================
    println!("3. Ben and Cat check their inboxes...\n");

    for user in ["ben", "cat"] {
        for pending in handshake.visibility.list_pending_incoming(user).expect("pending") {
            println!("   {} has a request from {} ({})", user, pending.first_name, pending.request_id);
        }
    }

    handshake.ledger.resolve_request(&to_ben, false).expect("deny");
    handshake.ledger.resolve_request(&to_cat, true).expect("grant");
    println!("   Ben declined, Cat accepted");

    match handshake.ledger.resolve_request(&to_ben, true) {
        Ok(_) => println!("   [FAIL] Second answer was accepted"),
        Err(e) => println!("   [OK] Second answer rejected: {}", e),
    }
    println!();

    // =========================================================================
    // STEP 4: What Ann can see now
    // =========================================================================
    println!("4. Ann's view after the answers...\n");

    for contact in handshake.visibility.list_granted("ann").expect("granted") {
        println!(
            "   Granted: {}",
            serde_json::to_string(&contact).expect("serialize contact")
        );
    }
    for summary in handshake.visibility.list_discoverable("ann").expect("discover") {
        println!("   Still discoverable: {}", summary.user_id);
    }

    let stats = handshake.stats().expect("stats");
    println!();
    println!(
        "   users={} pending={} granted={} denied={}",
        stats.users, stats.pending_requests, stats.granted_requests, stats.denied_requests
    );

    // let the worker drain
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\n=================================================");
    println!("                  DEMO COMPLETE");
    println!("=================================================");
}
