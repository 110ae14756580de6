//! Tally state: camera assignment, switcher state and the derived indication.

use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::config::{ConfigStore, KeyValueStorage, StorageError, keys};
use crate::constants::MAX_CAMERAS;

/// A camera number as sent by the switcher. `0` means "no camera".
pub type CameraNumber = u8;

/// What the tally light should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyIndication {
    /// This camera is on air.
    Live,
    /// This camera is queued next.
    Preview,
    /// Neither live nor preview.
    Standby,
    /// No camera number known yet.
    Unassigned,
}

impl TallyIndication {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Preview => "PREVIEW",
            Self::Standby => "STANDBY",
            Self::Unassigned => "UNASSIGNED",
        }
    }
}

/// Resolve the indication for `assignment` against the switcher's view.
///
/// Live wins when a camera is (abnormally) reported as both live and preview.
pub fn resolve(
    assignment: Option<CameraNumber>,
    live: CameraNumber,
    preview: CameraNumber,
) -> TallyIndication {
    match assignment {
        None => TallyIndication::Unassigned,
        Some(camera) if camera == live => TallyIndication::Live,
        Some(camera) if camera == preview => TallyIndication::Preview,
        Some(_) => TallyIndication::Standby,
    }
}

/// Whether `camera` is a number a tally can be assigned to.
pub fn is_valid_camera(camera: i64) -> bool {
    (1..=i64::from(MAX_CAMERAS)).contains(&camera)
}

/// Last live/preview cameras seen from the switcher. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitcherState {
    pub live: CameraNumber,
    pub preview: CameraNumber,
}

impl SwitcherState {
    /// Apply the fields present in a message; returns whether anything changed.
    pub fn update(&mut self, live: Option<CameraNumber>, preview: Option<CameraNumber>) -> bool {
        let before = *self;
        if let Some(live) = live {
            self.live = live;
        }
        if let Some(preview) = preview {
            self.preview = preview;
        }
        before != *self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    #[error("camera {0} is outside the assignable range")]
    OutOfRange(i64),
    #[error("camera assignment not persisted: {0}")]
    Persist(StorageError),
}

/// This device's assignment plus the switcher state it is compared against.
#[derive(Debug, Clone, Default)]
pub struct TallyState {
    assignment: Option<CameraNumber>,
    switcher: SwitcherState,
}

impl TallyState {
    pub fn new(assignment: Option<CameraNumber>) -> Self {
        Self {
            assignment,
            switcher: SwitcherState::default(),
        }
    }

    /// Restore the persisted assignment; missing or invalid means unassigned.
    pub fn load<S: KeyValueStorage>(config: &mut ConfigStore<S>) -> Self {
        let assignment = match config.load::<i64>(keys::CAMERA) {
            Ok(camera) if is_valid_camera(camera) => Some(camera as CameraNumber),
            Ok(camera) => {
                warn!("Stored camera {} is out of range, ignoring", camera);
                None
            }
            Err(StorageError::NotFound) => None,
            Err(e) => {
                warn!("Stored camera unusable: {}", e);
                None
            }
        };
        debug!("Loaded camera assignment {:?}", assignment);
        Self::new(assignment)
    }

    pub fn assignment(&self) -> Option<CameraNumber> {
        self.assignment
    }

    pub fn switcher(&self) -> SwitcherState {
        self.switcher
    }

    pub fn indication(&self) -> TallyIndication {
        resolve(self.assignment, self.switcher.live, self.switcher.preview)
    }

    /// Record new live/preview cameras; returns whether anything changed.
    pub fn update_switcher(
        &mut self,
        live: Option<CameraNumber>,
        preview: Option<CameraNumber>,
    ) -> bool {
        self.switcher.update(live, preview)
    }

    /// Assign this device to `camera` and persist it.
    ///
    /// Out-of-range numbers are rejected without touching any state. The
    /// in-memory assignment is updated even if persisting fails, in which
    /// case [`TallyError::Persist`] reports the storage problem. Returns
    /// whether the assignment changed.
    pub fn set_assignment<S: KeyValueStorage>(
        &mut self,
        camera: i64,
        config: &mut ConfigStore<S>,
    ) -> Result<bool, TallyError> {
        if !is_valid_camera(camera) {
            return Err(TallyError::OutOfRange(camera));
        }
        let camera = camera as CameraNumber;
        let changed = self.assignment != Some(camera);
        self.assignment = Some(camera);
        info!("Assigned to camera {}", camera);

        config
            .set(keys::CAMERA, &camera)
            .map_err(TallyError::Persist)?;
        Ok(changed)
    }
}
