//! Resource acquirer, surface half: host document surfaces and their
//! single-use detachment into an exclusively owned offscreen surface.

use std::collections::HashMap;

use cadence_core::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Opaque identifier of a drawable region in the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A surface detached from the host.
///
/// Neither `Clone` nor `Copy`: handing it on moves it, and the previous
/// owner keeps nothing it could draw with.
#[derive(Debug)]
pub struct OffscreenSurface {
    id: SurfaceId,
    width: u32,
    height: u32,
    frames_presented: u64,
}

impl OffscreenSurface {
    pub fn id(&self) -> &SurfaceId {
        &self.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Present one frame. Returns the new frame number.
    pub fn present(&mut self) -> u64 {
        self.frames_presented += 1;
        self.frames_presented
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

enum SurfaceSlot {
    Attached {
        width: u32,
        height: u32,
        frames_drawn: u64,
    },
    Detached,
}

/// Host-side surfaces, keyed by id.
#[derive(Default)]
pub struct HostDocument {
    surfaces: Mutex<HashMap<SurfaceId, SurfaceSlot>>,
}

impl HostDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a drawable surface. Re-adding an attached id replaces it;
    /// a detached id stays detached for the life of the document.
    pub fn add_surface(&self, id: SurfaceId, width: u32, height: u32) -> Result<()> {
        let mut surfaces = self.surfaces.lock();
        if let Some(SurfaceSlot::Detached) = surfaces.get(&id) {
            return Err(Error::SurfaceUnavailable(format!(
                "surface {:?} already detached",
                id.as_str()
            )));
        }
        surfaces.insert(
            id,
            SurfaceSlot::Attached {
                width,
                height,
                frames_drawn: 0,
            },
        );
        Ok(())
    }

    /// Detach a surface for another context to own. Single use per id.
    pub fn detach_surface(&self, id: &SurfaceId) -> Result<OffscreenSurface> {
        let mut surfaces = self.surfaces.lock();
        let slot = surfaces
            .get_mut(id)
            .ok_or_else(|| Error::SurfaceUnavailable(format!("no surface with id {:?}", id.as_str())))?;

        match std::mem::replace(slot, SurfaceSlot::Detached) {
            SurfaceSlot::Attached { width, height, .. } => {
                info!("Surface {} detached ({}x{})", id, width, height);
                Ok(OffscreenSurface {
                    id: id.clone(),
                    width,
                    height,
                    frames_presented: 0,
                })
            }
            SurfaceSlot::Detached => Err(Error::SurfaceUnavailable(format!(
                "surface {:?} already detached",
                id.as_str()
            ))),
        }
    }

    /// Draw on a host-owned surface. Returns the host frame count.
    ///
    /// Fails with `TransferViolation` once the surface has been detached.
    pub fn draw(&self, id: &SurfaceId) -> Result<u64> {
        let mut surfaces = self.surfaces.lock();
        match surfaces.get_mut(id) {
            Some(SurfaceSlot::Attached { frames_drawn, .. }) => {
                *frames_drawn += 1;
                Ok(*frames_drawn)
            }
            Some(SurfaceSlot::Detached) => Err(Error::TransferViolation(format!(
                "surface {:?} was detached; the host no longer owns it",
                id.as_str()
            ))),
            None => Err(Error::SurfaceUnavailable(format!(
                "no surface with id {:?}",
                id.as_str()
            ))),
        }
    }

    pub fn is_detached(&self, id: &SurfaceId) -> bool {
        matches!(self.surfaces.lock().get(id), Some(SurfaceSlot::Detached))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> (HostDocument, SurfaceId) {
        let doc = HostDocument::new();
        let id = SurfaceId::new("c");
        doc.add_surface(id.clone(), 640, 480).unwrap();
        (doc, id)
    }

    #[test]
    fn test_detach_once() {
        let (doc, id) = document();
        let surface = doc.detach_surface(&id).unwrap();
        assert_eq!(surface.id(), &id);
        assert_eq!(surface.size(), (640, 480));
        assert!(doc.is_detached(&id));

        let err = doc.detach_surface(&id).unwrap_err();
        assert!(matches!(err, Error::SurfaceUnavailable(_)));
    }

    #[test]
    fn test_detached_id_cannot_be_re_added() {
        let (doc, id) = document();
        let surface = doc.detach_surface(&id).unwrap();

        let err = doc.add_surface(id.clone(), 1024, 768).unwrap_err();
        assert!(matches!(err, Error::SurfaceUnavailable(_)));
        assert!(doc.is_detached(&id));
        assert!(matches!(
            doc.detach_surface(&id),
            Err(Error::SurfaceUnavailable(_))
        ));
        assert!(matches!(doc.draw(&id), Err(Error::TransferViolation(_))));

        // The first detachment still owns the original dimensions.
        assert_eq!(surface.size(), (640, 480));
    }

    #[test]
    fn test_re_add_attached_replaces() {
        let (doc, id) = document();
        doc.add_surface(id.clone(), 1024, 768).unwrap();
        let surface = doc.detach_surface(&id).unwrap();
        assert_eq!(surface.size(), (1024, 768));
    }

    #[test]
    fn test_detach_unknown() {
        let (doc, _) = document();
        assert!(matches!(
            doc.detach_surface(&SurfaceId::new("missing")),
            Err(Error::SurfaceUnavailable(_))
        ));
    }

    #[test]
    fn test_host_cannot_draw_after_detach() {
        let (doc, id) = document();
        assert_eq!(doc.draw(&id).unwrap(), 1);
        let _surface = doc.detach_surface(&id).unwrap();
        assert!(matches!(doc.draw(&id), Err(Error::TransferViolation(_))));
    }

    #[test]
    fn test_present_counts_frames() {
        let (doc, id) = document();
        let mut surface = doc.detach_surface(&id).unwrap();
        assert_eq!(surface.present(), 1);
        assert_eq!(surface.present(), 2);
        assert_eq!(surface.frames_presented(), 2);
    }
}
