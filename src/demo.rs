//! Interactive protocol demonstration.
//!
//! Walks through one epoch: identities publish flip keys, the pool rejects
//! duplicates and ineligible senders, the epoch rolls over, scores are folded
//! and the next validation is scheduled.

use std::sync::Arc;

use chrono::Utc;

use crate::config::FlipchainConfig;
use crate::crypto::keys::SigningKeypair;
use crate::flip_key::FlipKey;
use crate::node::epoch;
use crate::node::events::NodeEvent;
use crate::node::keys_pool::KeysPool;
use crate::node::validation::{EpochHead, IdentityState};
use crate::score::{aggregate_scores, decode_score, encode_score};

/// Run the protocol demonstration with the pool limits from `config`.
pub fn run_demo(config: &FlipchainConfig) {
    println!("=== FLIPCHAIN: flip key admission and identity scoring ===\n");

    // ────────────────────────────────────────────────────────
    // 1. IDENTITIES
    // ────────────────────────────────────────────────────────
    println!("[1] Generating identity signing keys (Dilithium5)...");

    let validator = Arc::new(config.keys_pool.validator());
    let names = ["alice", "bob", "carol", "mallory"];
    let identities: Vec<SigningKeypair> =
        names.iter().map(|_| SigningKeypair::generate()).collect();
    let states = [
        IdentityState::Verified,
        IdentityState::Human,
        IdentityState::Newbie,
        IdentityState::Killed,
    ];
    for ((name, kp), state) in names.iter().zip(&identities).zip(states) {
        validator.set_state(kp.address(), state);
        println!("    {:<8} {}  {:?}", name, kp.address(), state);
    }

    // ────────────────────────────────────────────────────────
    // 2. KEY PUBLICATION
    // ────────────────────────────────────────────────────────
    let head = EpochHead {
        height: 120_000,
        hash: crate::hash_domain(b"flipchain.demo", b"head"),
        epoch: 12,
    };
    let (sink, mut events) = config.keys_pool.event_sink();
    let pool = KeysPool::new(validator.clone(), Arc::new(sink));
    pool.initialize(head);
    println!(
        "\n[2] Epoch {} answer window closed at height {}, collecting flip keys \
         (max {} bytes, event capacity {})...",
        head.epoch,
        head.height,
        config.keys_pool.max_key_bytes,
        config.keys_pool.event_capacity
    );

    let mut submissions = Vec::new();
    for (i, kp) in identities.iter().enumerate() {
        let key = FlipKey::new_signed(vec![i as u8 + 1; 32], head.epoch, kp);
        submissions.push((names[i], key));
    }
    // A byte-identical resubmission and a second key from the same sender.
    submissions.push(("alice", submissions[0].1.clone()));
    submissions.push((
        "bob",
        FlipKey::new_signed(vec![0xbb; 32], head.epoch, &identities[1]),
    ));

    for (name, key) in submissions {
        match pool.add(key) {
            Ok(()) => println!("    {:<8} admitted", name),
            Err(e) => println!("    {:<8} rejected: {}", name, e),
        }
    }

    let mut published = 0;
    while let Ok(NodeEvent::NewFlipKey(_)) = events.try_recv() {
        published += 1;
    }
    println!(
        "    {} keys in pool, {} admission events received",
        pool.len(),
        published
    );

    // ────────────────────────────────────────────────────────
    // 3. SCORES
    // ────────────────────────────────────────────────────────
    println!("\n[3] Folding alice's score history...");
    let history = [encode_score(5.5, 6), encode_score(6.0, 6), encode_score(4.5, 5)];
    for byte in history {
        let (points, flips) = decode_score(byte);
        println!("    packed 0x{:02x} -> {} points / {} flips", byte, points, flips);
    }
    let total = aggregate_scores(&history, 20.0, 24);
    println!(
        "    cumulative: {} points / {} flips (ratio {:.3}, verified: {}, human: {})",
        total.points,
        total.flips,
        total.ratio(),
        total.meets_verified_threshold(),
        total.meets_human_threshold()
    );

    // ────────────────────────────────────────────────────────
    // 4. ROLLOVER
    // ────────────────────────────────────────────────────────
    println!("\n[4] Rolling over to the next epoch...");
    let next_head = EpochHead {
        height: head.height + 1,
        hash: crate::hash_domain(b"flipchain.demo", b"next-head"),
        epoch: head.epoch + 1,
    };
    let result = epoch::rollover(&pool, next_head, Utc::now(), validator.network_size());
    let schedule = &result.schedule;
    println!("    {} flip keys handed to the decryption stage", result.keys.len());
    println!("    network size:        {}", schedule.network_size);
    println!(
        "    short session flips: {} (+{} extra)",
        schedule.short_session_flips, schedule.short_session_extra_flips
    );
    println!("    long session flips:  {}", schedule.long_session_flips);
    println!("    invite quota:        {}", schedule.invite_quota);
    println!("    epoch length:        {} days", schedule.epoch_days);
    println!("    next validation:     {}", schedule.next_validation);
    println!("    pool empty:          {}", pool.is_empty());

    println!("\n=== Demo complete ===");
}
