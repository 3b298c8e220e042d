//! Composing the node's own messages: key announcement, public and
//! private rumors, route rumors.
//!
//! Creating a message is a three-step dance so the event loop never
//! mines: reserve the next ID and build the content on the loop, sign
//! and mine on a blocking thread, then re-enter the loop to insert —
//! re-checking that no concurrent composition took the ID in the
//! meantime.

use rumormill_protocol::packet::GossipPacket;
use rumormill_protocol::pow::compute_nonce;
use rumormill_protocol::rumor::RumorMessage;
use rumormill_types::{Result, RumormillError};

use crate::gossip::spawn_mongering;
use crate::handle::NodeHandle;
use crate::state::{record_from_rumor, NodeState};

// ---------------------------------------------------------------------------
// Key announcement
// ---------------------------------------------------------------------------

/// Inserts this node's key announcement `(name, 0)` if the log does
/// not have one yet. Runs synchronously at startup, before the event
/// loop exists.
pub fn insert_key_announcement(state: &mut NodeState) -> Result<()> {
    if state.store.next_id(state.name())? > 0 {
        return Ok(());
    }
    let mut msg = RumorMessage {
        origin: state.name().to_string(),
        destination: String::new(),
        id: 0,
        content: state.handle.keypair.public_key().as_bytes().to_vec(),
        signature: Vec::new(),
        nonce: Vec::new(),
        previous_hop: None,
    };
    compute_nonce(&mut msg, state.handle.config.pow_difficulty);
    state.store.insert_or_update(&record_from_rumor(&msg, ""))?;
    tracing::info!("key announcement inserted into the log");
    Ok(())
}

// ---------------------------------------------------------------------------
// New messages
// ---------------------------------------------------------------------------

/// Builds, signs, mines and inserts a new message from this node.
///
/// `destination` empty means a public plaintext message (or a route
/// rumor when `text` is empty too); otherwise `text` is sealed to the
/// destination's announced key, with a second copy sealed to our own
/// key so the local log stays readable:
/// `content = split(le u16) || blob_to_dest || blob_to_self`.
///
/// Returns the inserted rumor so the caller can gossip it.
///
/// # Errors
///
/// - [`RumormillError::NotFound`] if the destination has never
///   announced a key.
/// - [`RumormillError::InvalidMessage`] if the sealed content would
///   overflow the split-point encoding.
pub async fn add_new_message(
    handle: &NodeHandle,
    text: String,
    destination: String,
) -> Result<RumorMessage> {
    loop {
        let (id, content) = {
            let text = text.clone();
            let destination = destination.clone();
            handle
                .run_sync(move |state| -> Result<(u32, Vec<u8>)> {
                    let id = state.store.next_id(state.name())?;
                    let content = build_content(state, &text, &destination)?;
                    Ok((id, content))
                })
                .await??
        };

        let mut msg = RumorMessage {
            origin: handle.name.clone(),
            destination: destination.clone(),
            id,
            content,
            signature: Vec::new(),
            nonce: Vec::new(),
            previous_hop: None,
        };
        msg.signature = handle.keypair.sign(&msg.payload()).as_bytes().to_vec();

        let target = handle.config.pow_difficulty;
        let msg = tokio::task::spawn_blocking(move || {
            compute_nonce(&mut msg, target);
            msg
        })
        .await
        .map_err(|e| RumormillError::CryptoError {
            reason: format!("proof-of-work task failed: {e}"),
        })?;

        let inserted = {
            let msg = msg.clone();
            handle
                .run_sync(move |state| -> Result<bool> {
                    // A concurrent composition may have taken this ID
                    // while we were mining.
                    if state.store.next_id(state.name())? != msg.id {
                        return Ok(false);
                    }
                    state.store.insert_or_update(&record_from_rumor(&msg, ""))?;
                    Ok(true)
                })
                .await??
        };
        if inserted {
            return Ok(msg);
        }
        tracing::debug!(id, "message ID taken while mining, retrying");
    }
}

fn build_content(state: &NodeState, text: &str, destination: &str) -> Result<Vec<u8>> {
    if destination.is_empty() {
        return Ok(text.as_bytes().to_vec());
    }
    let dest_key = state
        .announced_key_of(destination)?
        .ok_or_else(|| RumormillError::NotFound {
            reason: format!("no key announcement known for '{destination}'"),
        })?;
    let to_dest = rumormill_crypto::sealed::seal(&state.handle.keypair, &dest_key, text.as_bytes())?;
    let to_self = rumormill_crypto::sealed::seal(
        &state.handle.keypair,
        &state.handle.keypair.public_key(),
        text.as_bytes(),
    )?;
    let split = u16::try_from(to_dest.len()).map_err(|_| RumormillError::InvalidMessage {
        reason: "private message too large".into(),
    })?;
    let mut content = Vec::with_capacity(2 + to_dest.len() + to_self.len());
    content.extend_from_slice(&split.to_le_bytes());
    content.extend_from_slice(&to_dest);
    content.extend_from_slice(&to_self);
    Ok(content)
}

/// Composes a message and starts gossiping it to one random peer.
pub async fn send_message(handle: &NodeHandle, text: String, destination: String) -> Result<u32> {
    let msg = add_new_message(handle, text, destination).await?;
    let id = msg.id;
    handle
        .run_sync(move |state| {
            if let Some(peer) = state.random_peer(&[]) {
                tracing::info!("MONGERING with {peer}");
                spawn_mongering(state.handle.clone(), msg, peer);
            }
        })
        .await?;
    Ok(id)
}

/// Composes a route rumor (empty content) and broadcasts it to every
/// peer, coin flip skipped.
pub async fn broadcast_route_rumor(handle: &NodeHandle) -> Result<()> {
    let msg = add_new_message(handle, String::new(), String::new()).await?;
    handle
        .run_sync(move |state| {
            let packet = GossipPacket::rumor(msg);
            for peer in state.peers.keys() {
                state.send_packet(&packet, peer);
            }
        })
        .await
}

// ---------------------------------------------------------------------------
// Reading the log back
// ---------------------------------------------------------------------------

/// Renders a stored message's content for the front-end.
///
/// Key announcements get a fixed caption; public content is shown as
/// lossy UTF-8; private content is unsealed with our key (the
/// to-self copy when we are the origin, the to-dest copy when we are
/// the destination). Anything we cannot decrypt — including private
/// traffic merely gossiped through us — renders as a placeholder.
pub fn display_content(state: &NodeState, record: &rumormill_store::MessageRecord) -> String {
    const UNREADABLE: &str = "*** Unable to decrypt the message ***";

    if record.id == 0 {
        return "Joined the network for the first time and announced its public key.".into();
    }
    if record.destination.is_empty() {
        return String::from_utf8_lossy(&record.content).into_owned();
    }

    let origin_is_self = record.origin == state.name();
    if !origin_is_self && record.destination != state.name() {
        return UNREADABLE.into();
    }
    if record.content.len() < 2 {
        return UNREADABLE.into();
    }
    let split = u16::from_le_bytes([record.content[0], record.content[1]]) as usize;
    let rest = &record.content[2..];
    if split > rest.len() {
        return UNREADABLE.into();
    }
    let blob = if origin_is_self {
        &rest[split..]
    } else {
        &rest[..split]
    };

    let sender_key = match state.announced_key_of(&record.origin) {
        Ok(Some(key)) => key,
        _ => return UNREADABLE.into(),
    };
    match rumormill_crypto::sealed::open(&state.handle.keypair, &sender_key, blob) {
        Ok(plain) => String::from_utf8_lossy(&plain).into_owned(),
        Err(_) => UNREADABLE.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::handle_rumor;
    use crate::testutil::{announcement, signed_rumor, test_node, TestNode};
    use rumormill_crypto::keys::Keypair;
    use rumormill_crypto::sealed::seal;

    #[tokio::test]
    async fn key_announcement_inserted_once() -> Result<()> {
        let TestNode { mut state, .. } = test_node().await;
        insert_key_announcement(&mut state)?;
        insert_key_announcement(&mut state)?;
        let name = state.name().to_string();
        assert_eq!(state.store.next_id(&name)?, 1);

        // The announcement must verify like any incoming rumor would.
        let record = state.store.get(&name, 0)?.expect("announcement");
        let rumor = crate::state::rumor_from_record(record);
        rumormill_protocol::verify::verify_rumor(
            &rumor,
            state.handle.config.pow_difficulty,
            None,
        )?;
        Ok(())
    }

    #[tokio::test]
    async fn display_content_of_announcement_is_caption() -> Result<()> {
        let TestNode { mut state, .. } = test_node().await;
        insert_key_announcement(&mut state)?;
        let name = state.name().to_string();
        let record = state.store.get(&name, 0)?.expect("announcement");
        assert!(display_content(&state, &record).contains("announced its public key"));
        Ok(())
    }

    #[tokio::test]
    async fn private_message_to_us_decrypts() -> Result<()> {
        let TestNode { mut state, .. } = test_node().await;
        insert_key_announcement(&mut state)?;
        let our_name = state.name().to_string();

        // A peer announces itself, then sends us a sealed rumor laid
        // out as split || to_dest || to_self.
        let peer_kp = Keypair::from_seed(&[0x88; 32]);
        handle_rumor(&mut state, announcement(&peer_kp), "127.0.0.1:42000")?;

        let our_key = state.handle.keypair.public_key();
        let to_dest = seal(&peer_kp, &our_key, b"psst")?;
        let to_self = seal(&peer_kp, &peer_kp.public_key(), b"psst")?;
        let mut content = (to_dest.len() as u16).to_le_bytes().to_vec();
        content.extend_from_slice(&to_dest);
        content.extend_from_slice(&to_self);

        let msg = signed_rumor(&peer_kp, 1, &content, &our_name);
        let origin = msg.origin.clone();
        handle_rumor(&mut state, msg, "127.0.0.1:42000")?;

        let record = state.store.get(&origin, 1)?.expect("stored");
        assert_eq!(display_content(&state, &record), "psst");
        Ok(())
    }

    #[tokio::test]
    async fn gossiped_third_party_private_message_is_unreadable() -> Result<()> {
        let TestNode { mut state, .. } = test_node().await;
        insert_key_announcement(&mut state)?;

        let peer_kp = Keypair::from_seed(&[0x88; 32]);
        handle_rumor(&mut state, announcement(&peer_kp), "127.0.0.1:42000")?;
        let msg = signed_rumor(&peer_kp, 1, b"\x05\x00opaque-bytes", "zzzzzzzzzzzzzzzz");
        let origin = msg.origin.clone();
        handle_rumor(&mut state, msg, "127.0.0.1:42000")?;

        let record = state.store.get(&origin, 1)?.expect("stored");
        assert!(display_content(&state, &record).contains("Unable to decrypt"));
        Ok(())
    }
}
