use crate::collaborators::CardStore;
use crate::error::ImportError;
use crate::models::ConvertedCard;

/// Writes converted cards to the store in fixed-size batches.
///
/// Batches commit independently: when one fails, earlier batches stay
/// persisted and the error reports how many cards were committed.
pub struct BatchPersister<'a> {
    store: &'a dyn CardStore,
    batch_size: usize,
}

impl<'a> BatchPersister<'a> {
    pub fn new(store: &'a dyn CardStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Insert every complete card and return how many were written
    pub fn persist(&self, cards: &[ConvertedCard]) -> Result<usize, ImportError> {
        let complete: Vec<ConvertedCard> = cards
            .iter()
            .filter(|card| card.is_complete())
            .cloned()
            .collect();

        if complete.len() < cards.len() {
            log::debug!("Dropping {} incomplete cards", cards.len() - complete.len());
        }

        let mut committed = 0;
        for (index, batch) in complete.chunks(self.batch_size).enumerate() {
            if let Err(e) = self.store.insert_cards(batch) {
                log::warn!("Card batch {} failed after {} cards were committed: {}", index, committed, e);
                return Err(ImportError::Persistence {
                    committed,
                    message: e.to_string(),
                });
            }
            committed += batch.len();
            log::debug!("Committed batch {} ({} cards total)", index, committed);
        }

        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::models::NewDeck;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<usize>>,
        fail_on_batch: Option<usize>,
    }

    impl CardStore for RecordingStore {
        fn deck_owner(&self, _deck_id: &str) -> Result<Option<String>, BoxError> {
            Ok(None)
        }

        fn insert_deck(&self, _deck: &NewDeck) -> Result<String, BoxError> {
            Ok("deck".to_string())
        }

        fn insert_cards(&self, cards: &[ConvertedCard]) -> Result<(), BoxError> {
            let mut batches = self.batches.lock().unwrap();
            if self.fail_on_batch == Some(batches.len()) {
                return Err("connection reset".into());
            }
            batches.push(cards.len());
            Ok(())
        }
    }

    fn cards(count: usize) -> Vec<ConvertedCard> {
        (0..count)
            .map(|i| ConvertedCard {
                front: format!("front {i}"),
                back: format!("back {i}"),
                tags: Vec::new(),
                deck_id: "d1".to_string(),
                owner_id: "u1".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_batches_are_sized() {
        let store = RecordingStore::default();
        let written = BatchPersister::new(&store, 100).persist(&cards(250)).unwrap();
        assert_eq!(written, 250);
        assert_eq!(*store.batches.lock().unwrap(), vec![100, 100, 50]);
    }

    #[test]
    fn test_incomplete_cards_are_dropped() {
        let store = RecordingStore::default();
        let mut input = cards(3);
        input[1].back = "   ".to_string();
        let written = BatchPersister::new(&store, 10).persist(&input).unwrap();
        assert_eq!(written, 2);
    }

    #[test]
    fn test_failed_batch_reports_committed_count() {
        let store = RecordingStore {
            fail_on_batch: Some(1),
            ..Default::default()
        };
        let err = BatchPersister::new(&store, 2).persist(&cards(5)).unwrap_err();
        match err {
            ImportError::Persistence { committed, message } => {
                assert_eq!(committed, 2);
                assert_eq!(message, "connection reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*store.batches.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_nothing_to_persist() {
        let store = RecordingStore::default();
        assert_eq!(BatchPersister::new(&store, 0).persist(&[]).unwrap(), 0);
        assert!(store.batches.lock().unwrap().is_empty());
    }
}
