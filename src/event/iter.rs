//! Pull-based cursor over event occurrences.

use std::collections::VecDeque;

use futures::Stream;

use crate::{
    error::Error,
    event::{EventRecord, Occurrence},
    transport::{LogSubscription, RawLog},
};

/// Where the iterator's raw logs come from.
enum Feed {
    /// Bounded history, already retrieved.
    Replay(VecDeque<RawLog>),
    /// Standing transport subscription.
    Live(LogSubscription),
}

/// A stateful cursor unifying "replay history" and "ride the live feed"
/// behind one pull interface.
///
/// [`advance`](Self::advance) moves the cursor; [`current`](Self::current)
/// is the occurrence it stopped on. Once the feed completes, records the
/// transport already delivered still drain before `advance` reports the
/// end. A decode failure is terminal: the iterator never recovers and
/// never skips past a bad record, since a skip would silently hide ledger
/// corruption or a descriptor mismatch. Not meant to be shared across
/// tasks.
pub struct EventIterator<E: EventRecord> {
    current: Option<Occurrence<E>>,
    feed: Feed,
    /// Completion flag: the feed is known to produce nothing further.
    ended: bool,
    failure: Option<Error>,
}

impl<E: EventRecord> std::fmt::Debug for EventIterator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventIterator")
            .field("ended", &self.ended)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

impl<E: EventRecord> EventIterator<E> {
    pub(crate) fn replay(logs: Vec<RawLog>) -> Self {
        Self {
            current: None,
            feed: Feed::Replay(logs.into()),
            ended: false,
            failure: None,
        }
    }

    pub(crate) fn live(subscription: LogSubscription) -> Self {
        Self {
            current: None,
            feed: Feed::Live(subscription),
            ended: false,
            failure: None,
        }
    }

    /// Advances the cursor. Returns `true` with a new
    /// [`current`](Self::current) occurrence, or `false` when the source is
    /// exhausted or failed; [`error`](Self::error) distinguishes the two.
    ///
    /// In live mode this suspends until the transport delivers a log or
    /// ends the subscription.
    pub async fn advance(&mut self) -> bool {
        if self.failure.is_some() {
            self.current = None;
            return false;
        }

        let raw = match &mut self.feed {
            Feed::Replay(buffered) => buffered.pop_front(),
            Feed::Live(subscription) => {
                if self.ended {
                    // Closed or terminated feed: drain what the transport
                    // already delivered, nothing more arrives.
                    match subscription.logs.try_recv() {
                        Ok(raw) => Some(raw),
                        Err(_) => {
                            // A terminal cause that raced the close still
                            // outranks plain exhaustion.
                            if let Ok(cause) = subscription.failure.try_recv() {
                                self.failure = Some(cause);
                            }
                            None
                        }
                    }
                } else {
                    match subscription.logs.recv().await {
                        Some(raw) => Some(raw),
                        None => {
                            self.ended = true;
                            subscription.handle.unsubscribe();
                            if let Ok(cause) = subscription.failure.try_recv() {
                                self.failure = Some(cause);
                            }
                            None
                        }
                    }
                }
            }
        };

        match raw {
            Some(raw) => self.set_current(raw),
            None => {
                self.ended = true;
                self.current = None;
                false
            }
        }
    }

    fn set_current(&mut self, raw: RawLog) -> bool {
        match E::decode(&raw) {
            Ok(event) => {
                self.current = Some(Occurrence::new(event, raw));
                true
            }
            Err(cause) => {
                self.failure = Some(Error::Decoding(cause));
                self.current = None;
                if let Feed::Live(subscription) = &mut self.feed {
                    subscription.handle.unsubscribe();
                }
                false
            }
        }
    }

    /// The occurrence the last successful [`advance`](Self::advance)
    /// stopped on.
    pub fn current(&self) -> Option<&Occurrence<E>> {
        self.current.as_ref()
    }

    pub fn take_current(&mut self) -> Option<Occurrence<E>> {
        self.current.take()
    }

    /// Terminal cause when the last `advance` returned `false` due to
    /// failure rather than exhaustion.
    pub fn error(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Releases the underlying transport subscription. Idempotent, and safe
    /// to call after the iterator finished naturally. Records already
    /// delivered by the transport remain drainable via
    /// [`advance`](Self::advance).
    pub fn close(&mut self) {
        if let Feed::Live(subscription) = &mut self.feed {
            subscription.handle.unsubscribe();
        }
        self.ended = true;
    }

    /// Adapts the iterator into a [`Stream`] of occurrences, yielding the
    /// terminal failure, if any, as its last item.
    pub fn into_stream(self) -> impl Stream<Item = Result<Occurrence<E>, Error>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut iterator = state?;
            if iterator.advance().await {
                let occurrence = iterator.take_current()?;
                Some((Ok(occurrence), Some(iterator)))
            } else {
                iterator.failure.take().map(|cause| (Err(cause), None))
            }
        })
    }
}

impl<E: EventRecord> Drop for EventIterator<E> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256, Bytes, U256};

    use super::*;
    use crate::codec::CodecError;

    #[derive(Debug, PartialEq)]
    struct Numbered(u64);

    impl EventRecord for Numbered {
        const EVENT: &'static str = "Numbered";

        fn decode(raw: &RawLog) -> Result<Self, CodecError> {
            let bytes: [u8; 8] = raw
                .data
                .as_ref()
                .try_into()
                .map_err(|_| CodecError::new("payload is not 8 bytes"))?;
            Ok(Self(u64::from_be_bytes(bytes)))
        }
    }

    fn raw(block: u64, value: u64) -> RawLog {
        RawLog {
            address: Address::ZERO,
            selector: B256::from(U256::from(1)),
            topics: vec![],
            data: Bytes::copy_from_slice(&value.to_be_bytes()),
            block,
            tx_hash: B256::ZERO,
            tx_index: 0,
            log_index: 0,
        }
    }

    fn bad(block: u64) -> RawLog {
        let mut log = raw(block, 0);
        log.data = Bytes::copy_from_slice(&[0xde, 0xad]);
        log
    }

    #[test]
    fn replay_preserves_order_and_exhausts() {
        tokio_test::block_on(async {
            let mut it = EventIterator::<Numbered>::replay(vec![raw(1, 10), raw(2, 20)]);
            assert!(it.advance().await);
            assert_eq!(it.current().map(|o| o.event().0), Some(10));
            assert!(it.advance().await);
            assert_eq!(it.current().map(|o| o.event().0), Some(20));
            assert!(!it.advance().await);
            assert!(it.error().is_none());
            // Stays exhausted.
            assert!(!it.advance().await);
            assert!(it.current().is_none());
        });
    }

    #[test]
    fn decode_failure_is_permanent() {
        tokio_test::block_on(async {
            let mut it =
                EventIterator::<Numbered>::replay(vec![raw(1, 10), bad(2), raw(3, 30)]);
            assert!(it.advance().await);
            assert!(!it.advance().await);
            assert!(matches!(it.error(), Some(Error::Decoding(_))));
            // Never recovers, never yields the record past the bad one.
            assert!(!it.advance().await);
            assert!(matches!(it.error(), Some(Error::Decoding(_))));
            assert!(it.current().is_none());
        });
    }

    #[test]
    fn close_is_idempotent_on_replay() {
        tokio_test::block_on(async {
            let mut it = EventIterator::<Numbered>::replay(vec![raw(1, 10)]);
            it.close();
            it.close();
            // Buffered history still drains after close.
            assert!(it.advance().await);
            assert!(!it.advance().await);
        });
    }

    #[test]
    fn stream_adapter_yields_then_fails() {
        use futures::StreamExt;

        tokio_test::block_on(async {
            let it = EventIterator::<Numbered>::replay(vec![raw(1, 10), bad(2)]);
            let collected: Vec<_> = it.into_stream().collect().await;
            assert_eq!(collected.len(), 2);
            assert!(collected[0].is_ok());
            assert!(matches!(collected[1], Err(Error::Decoding(_))));
        });
    }
}
