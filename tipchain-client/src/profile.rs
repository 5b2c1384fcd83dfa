//! Profile Registration
//!
//! Decides whether the active identity is creating a profile or updating
//! the one it already owns, checks username availability while the user
//! types, and re-checks it at submission since the earlier answer may be
//! out of date by then.
//!
//! Availability checks are debounced: each check is a delayed task tagged
//! with a sequence number. Scheduling a new check aborts the previous task,
//! and results are delivered over a channel whose consumer applies only the
//! result carrying the latest sequence number.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ledger::Identity;
use crate::registry::{Profile, ProfileFields, RegistryGateway};
use crate::storage::ProfileHandoff;

/// Minimum username length
pub const MIN_USERNAME_LEN: usize = 3;

/// Default maximum username length
pub const MAX_USERNAME_LEN: usize = 30;

/// Default pause in typing before an availability check is sent
pub const AVAILABILITY_DEBOUNCE: Duration = Duration::from_millis(500);

/// Trim and lowercase a username as typed
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalise a username and check it against the registry's rules
pub fn validate_username(raw: &str, max_len: usize) -> Result<String> {
    let username = normalize_username(raw);
    let len = username.chars().count();

    if len < MIN_USERNAME_LEN {
        return Err(Error::ValidationError(format!(
            "username must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    if len > max_len {
        return Err(Error::ValidationError(format!(
            "username must be at most {} characters",
            max_len
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(Error::ValidationError(
            "username may only contain lowercase letters, numbers and underscores".to_string(),
        ));
    }
    Ok(username)
}

/// Whether the identity is creating or updating its profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileMode {
    Create,
    Update { existing: Profile },
}

/// Arbitration state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArbitrationState {
    #[default]
    Unchecked,
    Checking,
    Available,
    Taken,
    /// The availability check itself failed
    CheckFailed(String),
    Submitting,
    Created(Profile),
    Updated(Profile),
    SubmitRejected(Error),
}

/// Editable profile fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub profile_image: String,
    pub banner_image: String,
    pub twitter: String,
    pub website: String,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl ProfileForm {
    /// Registry payload for this form. Blank optional fields are omitted.
    pub fn to_fields(&self, username: &str) -> ProfileFields {
        ProfileFields {
            username: username.to_string(),
            name: self.display_name.trim().to_string(),
            bio: non_empty(&self.bio),
            profile_picture: non_empty(&self.profile_image),
            banner_image: non_empty(&self.banner_image),
            twitter: non_empty(&self.twitter),
            website: non_empty(&self.website),
        }
    }
}

impl From<&Profile> for ProfileForm {
    fn from(profile: &Profile) -> Self {
        Self {
            username: profile.username.clone(),
            display_name: profile.display_name.clone(),
            bio: profile.bio.clone().unwrap_or_default(),
            profile_image: profile.profile_image.clone().unwrap_or_default(),
            banner_image: profile.banner_image.clone().unwrap_or_default(),
            twitter: profile.social_links.twitter.clone().unwrap_or_default(),
            website: profile.social_links.website.clone().unwrap_or_default(),
        }
    }
}

/// Result of one debounced availability check
#[derive(Debug)]
pub struct AvailabilityEvent {
    pub seq: u64,
    pub username: String,
    pub result: Result<bool>,
}

/// Debounced availability checks
pub struct AvailabilityDebouncer {
    registry: RegistryGateway,
    window: Duration,
    seq: u64,
    task: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<AvailabilityEvent>,
}

impl AvailabilityDebouncer {
    pub fn new(
        registry: RegistryGateway,
        window: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<AvailabilityEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                registry,
                window,
                seq: 0,
                task: None,
                tx,
            },
            rx,
        )
    }

    /// Sequence number of the most recent check
    pub fn latest(&self) -> u64 {
        self.seq
    }

    /// Schedule a check for `username`, superseding any earlier one
    pub fn schedule(&mut self, username: String) -> u64 {
        self.cancel();
        let seq = self.seq;
        let registry = self.registry.clone();
        let window = self.window;
        let tx = self.tx.clone();

        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            debug!("Checking availability of '{}' (#{})", username, seq);
            let result = registry.is_username_available(&username).await;
            // The receiver is gone only when the arbitrator was dropped
            let _ = tx.send(AvailabilityEvent {
                seq,
                username,
                result,
            });
        }));
        seq
    }

    /// Abort the outstanding check, if any
    pub fn cancel(&mut self) {
        self.seq += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for AvailabilityDebouncer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Tunables for the arbitrator
#[derive(Debug, Clone)]
pub struct ProfileOptions {
    pub availability_debounce: Duration,
    pub max_username_len: usize,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            availability_debounce: AVAILABILITY_DEBOUNCE,
            max_username_len: MAX_USERNAME_LEN,
        }
    }
}

/// Create-or-update arbitration for the active identity's profile
pub struct ProfileArbitrator {
    registry: RegistryGateway,
    identity: Identity,
    handoff: ProfileHandoff,
    options: ProfileOptions,
    mode: ProfileMode,
    state: ArbitrationState,
    form: ProfileForm,
    debouncer: AvailabilityDebouncer,
    events: mpsc::UnboundedReceiver<AvailabilityEvent>,
}

impl ProfileArbitrator {
    pub fn new(
        registry: RegistryGateway,
        identity: Identity,
        handoff: ProfileHandoff,
        options: ProfileOptions,
    ) -> Self {
        let (debouncer, events) =
            AvailabilityDebouncer::new(registry.clone(), options.availability_debounce);
        Self {
            registry,
            identity,
            handoff,
            options,
            mode: ProfileMode::Create,
            state: ArbitrationState::Unchecked,
            form: ProfileForm::default(),
            debouncer,
            events,
        }
    }

    pub fn mode(&self) -> &ProfileMode {
        &self.mode
    }

    pub fn state(&self) -> &ArbitrationState {
        &self.state
    }

    pub fn form(&self) -> &ProfileForm {
        &self.form
    }

    /// Mutable access to the form. A username edited here is not checked
    /// for availability until `submit`, and in update mode `submit` rejects
    /// any username other than the existing one; use `set_username` for
    /// debounced checks.
    pub fn form_mut(&mut self) -> &mut ProfileForm {
        &mut self.form
    }

    /// Whether the username field can still be edited
    pub fn username_locked(&self) -> bool {
        matches!(self.mode, ProfileMode::Update { .. })
    }

    fn enter_update(&mut self, profile: Profile) {
        self.form = ProfileForm::from(&profile);
        self.mode = ProfileMode::Update { existing: profile };
        self.state = ArbitrationState::Unchecked;
    }

    /// Determine the mode. A handoff left by another flow is used first;
    /// otherwise the registry is asked for the identity's profile.
    pub async fn load(&mut self) -> Result<&ProfileMode> {
        if let Some(profile) = self.handoff.take() {
            if profile.owner == self.identity {
                debug!("Using handed-off profile '{}'", profile.username);
                self.enter_update(profile);
                return Ok(&self.mode);
            }
            warn!(
                "Discarding profile handoff owned by {}, not {}",
                profile.owner, self.identity
            );
        }

        match self.registry.profile_by_wallet(&self.identity).await? {
            Some(profile) => {
                info!("Editing existing profile '{}'", profile.username);
                self.enter_update(profile);
            }
            None => {
                info!("No profile for {}, creating one", self.identity);
                self.mode = ProfileMode::Create;
                self.state = ArbitrationState::Unchecked;
            }
        }
        Ok(&self.mode)
    }

    /// Change the username field and schedule an availability check.
    /// The username of an existing profile cannot change.
    pub fn set_username(&mut self, username: &str) -> Result<()> {
        if let ProfileMode::Update { existing } = &self.mode {
            if normalize_username(username) != existing.username {
                return Err(Error::ValidationError(
                    "username cannot be changed after the profile is created".to_string(),
                ));
            }
        }
        self.form.username = username.to_string();
        self.check_availability(username);
        Ok(())
    }

    /// Schedule a debounced availability check. Skipped for the existing
    /// profile's own username and for names that fail validation.
    pub fn check_availability(&mut self, username: &str) {
        let username = normalize_username(username);

        if let ProfileMode::Update { existing } = &self.mode {
            if existing.username == username {
                self.debouncer.cancel();
                self.state = ArbitrationState::Unchecked;
                return;
            }
        }

        if validate_username(&username, self.options.max_username_len).is_err() {
            self.debouncer.cancel();
            self.state = ArbitrationState::Unchecked;
            return;
        }

        self.state = ArbitrationState::Checking;
        self.debouncer.schedule(username);
    }

    fn apply(&mut self, event: AvailabilityEvent) -> bool {
        if event.seq != self.debouncer.latest() {
            debug!(
                "Discarding stale availability result for '{}' (#{})",
                event.username, event.seq
            );
            return false;
        }

        self.state = match event.result {
            Ok(true) => ArbitrationState::Available,
            Ok(false) => ArbitrationState::Taken,
            Err(e) => {
                warn!("Availability check for '{}' failed: {}", event.username, e);
                ArbitrationState::CheckFailed(e.to_string())
            }
        };
        true
    }

    /// Wait for the outstanding check to finish and apply its result.
    /// Returns immediately when no check is outstanding.
    pub async fn next_availability(&mut self) -> &ArbitrationState {
        while self.state == ArbitrationState::Checking {
            match self.events.recv().await {
                Some(event) => {
                    self.apply(event);
                }
                None => break,
            }
        }
        &self.state
    }

    /// Apply any results that have already arrived, without waiting
    pub fn poll_availability(&mut self) -> &ArbitrationState {
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
        }
        &self.state
    }

    /// Validate the form and send exactly one register or update call
    pub async fn submit(&mut self) -> Result<Profile> {
        let result = self.try_submit().await;
        if let Err(e) = &result {
            if self.state == ArbitrationState::Submitting {
                self.state = ArbitrationState::SubmitRejected(e.clone());
            }
        }
        result
    }

    async fn try_submit(&mut self) -> Result<Profile> {
        let username = validate_username(&self.form.username, self.options.max_username_len)?;
        if self.form.display_name.trim().is_empty() {
            return Err(Error::ValidationError("display name is required".to_string()));
        }

        // Any debounced answer is superseded by the checks below
        self.debouncer.cancel();

        let existing = match &self.mode {
            ProfileMode::Create => {
                match self.registry.is_username_available(&username).await {
                    Ok(true) => {}
                    Ok(false) => {
                        self.state = ArbitrationState::Taken;
                        return Err(Error::UsernameTaken(username));
                    }
                    Err(e) => {
                        self.state = ArbitrationState::CheckFailed(e.to_string());
                        return Err(e);
                    }
                }
                None
            }
            ProfileMode::Update { existing } => {
                if existing.username != username {
                    return Err(Error::ValidationError(
                        "username cannot be changed after the profile is created".to_string(),
                    ));
                }
                Some(existing.clone())
            }
        };

        self.state = ArbitrationState::Submitting;
        let fields = self.form.to_fields(&username);

        let profile = match existing {
            None => {
                self.registry
                    .register(&self.identity, &fields)
                    .await
                    .map_err(|e| match e {
                        // Only registry rejections arrive as ValidationError
                        Error::ValidationError(reason) if reason.contains("already exists") => {
                            Error::UsernameTaken(username.clone())
                        }
                        other => other,
                    })?;
                let profile = fields.into_profile(self.identity.clone());
                info!("Registered profile '{}'", profile.username);
                self.state = ArbitrationState::Created(profile.clone());
                profile
            }
            Some(existing) => {
                self.registry.update(&self.identity, &fields).await?;
                // Blank optional fields leave the stored values in place
                let mut profile = existing;
                fields.apply_to(&mut profile);
                info!("Updated profile '{}'", profile.username);
                self.state = ArbitrationState::Updated(profile.clone());
                profile
            }
        };

        self.mode = ProfileMode::Update {
            existing: profile.clone(),
        };
        self.form = ProfileForm::from(&profile);
        if let Err(e) = self.handoff.put(&profile) {
            warn!("Failed to cache profile: {}", e);
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username_normalises() {
        assert_eq!(validate_username("  Alice_01 ", 30).unwrap(), "alice_01");
    }

    #[test]
    fn test_validate_username_rejects() {
        let long = "x".repeat(31);
        for bad in ["ab", "", "has space", "dash-name", "émile", long.as_str()] {
            assert!(
                matches!(validate_username(bad, 30), Err(Error::ValidationError(_))),
                "expected rejection for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_form_blank_fields_become_none() {
        let form = ProfileForm {
            username: "alice".to_string(),
            display_name: " Alice ".to_string(),
            bio: "   ".to_string(),
            website: "https://alice.dev".to_string(),
            ..Default::default()
        };
        let fields = form.to_fields("alice");
        assert_eq!(fields.name, "Alice");
        assert_eq!(fields.bio, None);
        assert_eq!(fields.website.as_deref(), Some("https://alice.dev"));
    }
}
