use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::archive::PackageArchive;
use crate::collaborators::{CardStore, IdentityVerifier, ObjectStorage};
use crate::config::ImportConfig;
use crate::convert::{Converter, NoteOutcome};
use crate::database::{too_many_notes, CollectionDatabase};
use crate::error::ImportError;
use crate::media::{self, MediaUploader, UploadedMedia};
use crate::models::{
    ConvertedCard, ImportProgress, ImportStats, MediaManifestEntry, NewDeck, NoProgress,
    ProgressCallback,
};
use crate::persist::BatchPersister;
use crate::request::{bearer_token, DeckTarget, ImportOutcome, ImportRequest, ImportResponse};
use crate::script::{ExtendedScripts, ScriptPredicate};

/// Wall-clock budget for one import, checked between phases
struct Deadline {
    started: Instant,
    timeout: Duration,
}

impl Deadline {
    fn start(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn check(&self, phase: &str) -> Result<(), ImportError> {
        if self.started.elapsed() > self.timeout {
            log::warn!("Import exceeded its deadline before {}", phase);
            return Err(ImportError::Timeout {
                elapsed_ms: self.elapsed_ms(),
            });
        }
        Ok(())
    }
}

/// Imports `.apkg` packages into decks of the target store.
///
/// Holds only shared collaborator handles and immutable configuration, so
/// one instance can serve concurrent requests.
pub struct Importer {
    storage: Arc<dyn ObjectStorage>,
    store: Arc<dyn CardStore>,
    identity: Arc<dyn IdentityVerifier>,
    config: ImportConfig,
    predicate: Arc<dyn ScriptPredicate>,
    progress: Arc<dyn ProgressCallback>,
}

impl Importer {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        store: Arc<dyn CardStore>,
        identity: Arc<dyn IdentityVerifier>,
        config: ImportConfig,
    ) -> Self {
        Self {
            storage,
            store,
            identity,
            config,
            predicate: Arc::new(ExtendedScripts),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the script used for front refinement and scoring
    pub fn with_script(mut self, predicate: Arc<dyn ScriptPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Handle a raw HTTP request and produce the status code and JSON body
    pub fn handle(&self, authorization_header: Option<&str>, body: &str) -> (u16, ImportResponse) {
        let result = bearer_token(authorization_header)
            .and_then(|token| self.authenticate(token))
            .and_then(|user_id| {
                let request: ImportRequest = serde_json::from_str(body).map_err(|e| {
                    ImportError::Validation(format!("invalid request body: {e}"))
                })?;
                self.import_for_user(&user_id, &request)
            });

        match result {
            Ok(outcome) => (200, ImportResponse::from(outcome)),
            Err(e) => {
                log::warn!("Import failed: {}", e);
                (e.status_code(), ImportResponse::from(&e))
            }
        }
    }

    /// Import a package on behalf of the holder of `token`
    pub fn import(&self, token: &str, request: &ImportRequest) -> Result<ImportOutcome, ImportError> {
        let user_id = self.authenticate(token)?;
        self.import_for_user(&user_id, request)
    }

    fn authenticate(&self, token: &str) -> Result<String, ImportError> {
        match self.identity.verify(token) {
            Ok(Some(user_id)) => Ok(user_id),
            Ok(None) => Err(ImportError::Auth("invalid or expired token".to_string())),
            Err(e) => {
                log::warn!("Token verification failed: {}", e);
                Err(ImportError::Auth("could not verify token".to_string()))
            }
        }
    }

    fn check_ownership(&self, deck_id: &str, user_id: &str) -> Result<(), ImportError> {
        let owner = self
            .store
            .deck_owner(deck_id)
            .map_err(|e| ImportError::Storage(format!("deck lookup failed: {e}")))?;

        match owner {
            Some(owner) if owner == user_id => Ok(()),
            // A deck owned by someone else is reported as missing
            _ => Err(ImportError::NotFound(format!("deck {deck_id}"))),
        }
    }

    fn import_for_user(
        &self,
        user_id: &str,
        request: &ImportRequest,
    ) -> Result<ImportOutcome, ImportError> {
        let deadline = Deadline::start(self.config.timeout);

        let target = request.validate()?;
        if let DeckTarget::Existing { deck_id } = &target {
            self.check_ownership(deck_id, user_id)?;
        }

        // Phase 1: Download
        self.progress.on_progress(ImportProgress::Downloading);
        let data = self
            .storage
            .download(&request.bucket, &request.file_path)
            .map_err(|e| ImportError::Storage(format!("failed to download package: {e}")))?;
        log::info!("Downloaded {} ({} bytes)", request.file_path, data.len());
        deadline.check("extraction")?;

        // Phase 2: Open archive and database
        self.progress.on_progress(ImportProgress::Extracting);
        let mut archive = PackageArchive::from_bytes(data, self.config.max_package_bytes)?;
        let db = CollectionDatabase::open_from_bytes(&archive.extract_database()?)?;

        let note_count = db.note_count()?;
        if note_count > self.config.max_notes {
            return Err(too_many_notes(self.config.max_notes));
        }
        if note_count == 0 {
            return Err(ImportError::Format("no notes found".to_string()));
        }

        // Phase 3: Notes and note types
        self.progress.on_progress(ImportProgress::ReadingNotes);
        let models = db.read_models()?;
        let notes = db.read_notes(self.config.max_notes)?;
        drop(db);
        log::info!("Read {} notes across {} note types", notes.len(), models.len());
        deadline.check("media upload")?;

        // Phase 4: Media and deck
        self.progress.on_progress(ImportProgress::UploadingMedia);
        let manifest = archive.media_manifest()?;
        let referenced = media::referenced_filenames(&notes);
        let plan = media::plan_extraction(&manifest, &referenced, self.config.max_media_files);
        let (deck_id, created_new_deck, uploaded) =
            self.place_media(user_id, target, &mut archive, &plan, &deadline)?;
        log::info!("Uploaded {} of {} referenced media files", uploaded.objects.len(), referenced.len());
        deadline.check("conversion")?;

        // Phase 5: Convert
        self.progress.on_progress(ImportProgress::Converting);
        let converter = Converter::new(&models, Arc::clone(&self.predicate));
        let cards: Vec<ConvertedCard> = converter
            .convert_all(&notes, &uploaded.urls)
            .into_iter()
            .filter_map(|outcome| match outcome {
                NoteOutcome::Card(card) => Some(ConvertedCard {
                    front: card.front,
                    back: card.back,
                    tags: card.tags,
                    deck_id: deck_id.clone(),
                    owner_id: user_id.to_string(),
                }),
                NoteOutcome::Ignored { .. } => None,
            })
            .collect();
        log::info!("Converted {} of {} notes", cards.len(), notes.len());
        deadline.check("persistence")?;

        // Phase 6: Persist
        self.progress.on_progress(ImportProgress::Persisting);
        let cards_created =
            BatchPersister::new(self.store.as_ref(), self.config.batch_size).persist(&cards)?;

        let stats = ImportStats {
            total_notes: notes.len(),
            cards_created,
            notes_ignored: notes.len() - cards_created,
            media_files_processed: uploaded.objects.len(),
            elapsed_ms: deadline.elapsed_ms(),
        };
        log::info!(
            "Imported {} cards into deck {} ({} notes ignored, {}ms)",
            stats.cards_created,
            deck_id,
            stats.notes_ignored,
            stats.elapsed_ms
        );

        self.progress.on_progress(ImportProgress::Complete);

        Ok(ImportOutcome {
            deck_id,
            created_new_deck,
            stats,
        })
    }

    /// Upload referenced media and resolve the destination deck.
    ///
    /// Existing decks receive media directly under `decks/{id}`. New decks
    /// stage it under `tmp/{user}` and move it once the deck exists.
    fn place_media(
        &self,
        user_id: &str,
        target: DeckTarget,
        archive: &mut PackageArchive,
        plan: &[MediaManifestEntry],
        deadline: &Deadline,
    ) -> Result<(String, bool, UploadedMedia), ImportError> {
        let uploader = MediaUploader::new(self.storage.as_ref(), &self.config.media_bucket);

        match target {
            DeckTarget::Existing { deck_id } => {
                let uploaded = uploader.upload_all(archive, plan, &format!("decks/{deck_id}"));
                Ok((deck_id, false, uploaded))
            }
            DeckTarget::New {
                name,
                description,
                color,
            } => {
                let staged = uploader.upload_all(archive, plan, &format!("tmp/{user_id}"));
                deadline.check("deck creation")?;

                let deck = NewDeck {
                    owner_id: user_id.to_string(),
                    name,
                    description,
                    color,
                };
                let deck_id = self.store.insert_deck(&deck).map_err(|e| {
                    ImportError::Persistence {
                        committed: 0,
                        message: format!("failed to create deck: {e}"),
                    }
                })?;
                log::info!("Created deck {} ({})", deck.name, deck_id);

                let uploaded = uploader.relocate(staged, &format!("decks/{deck_id}"));
                Ok((deck_id, true, uploaded))
            }
        }
    }
}
