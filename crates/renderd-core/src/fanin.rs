//! Generic queue fan-in (C4): merges several `tokio::mpsc` receivers into one
//! tagged stream.
//!
//! This is the only mechanism by which the otherwise single-threaded broker
//! learns about external events (new submissions, worker results). The
//! original broker this is modeled on used a `STOP` sentinel value pushed
//! through each source to signal end-of-stream; here a source's natural
//! channel closure plays that role instead, which is the idiomatic
//! equivalent and removes a whole class of "forgot to forward STOP" bugs.

use tokio::sync::mpsc;

/// One item read off the fan-in, tagged with which source produced it.
pub struct Tagged<S, T> {
    pub source: S,
    pub item: T,
}

/// Merge `sources` (each labeled by a value of `S`) into a single channel.
///
/// Each input is drained concurrently by its own forwarder task. A source
/// closing its sending half simply stops contributing; the merged channel
/// itself closes once every forwarder has exited and their handles are
/// dropped. `S` must be `Clone` so each forwarder can tag its own output.
pub fn fan_in<S, T>(
    sources: Vec<(S, mpsc::Receiver<T>)>,
    buffer: usize,
) -> mpsc::Receiver<Tagged<S, T>>
where
    S: Clone + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer);
    for (source, mut input) in sources {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = input.recv().await {
                if tx.send(Tagged { source: source.clone(), item }).await.is_err() {
                    break;
                }
            }
        });
    }
    rx
}
