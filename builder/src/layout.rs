// Licensed under the Apache-2.0 license

//! Component registry and layout solver.
//!
//! A build starts from a per-boot-source template in which some components
//! carry fixed, hardware-mandated offsets and the rest are auto-positioned.
//! The solver assigns every auto component a concrete offset so that no two
//! padded component ranges overlap and every alignment constraint holds.

use crate::error::LayoutError;
use log::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentId {
    /// Reserved first sector on block media; never written, only kept free.
    MbrReserved,
    Ivt,
    QspiParams,
    Dcd,
    HseFirmware,
    HseSysImg,
    AppHeader,
    Code,
}

#[derive(Clone, Debug)]
pub struct ImageComponent {
    pub id: ComponentId,
    /// `None` until the solver places the component.
    pub offset: Option<u64>,
    pub size: u64,
    /// `0` means no alignment constraint.
    pub alignment: u64,
    /// Trailing bytes kept free after the component (errata workaround).
    pub padding: u64,
}

impl ImageComponent {
    pub fn fixed(id: ComponentId, offset: u64, size: u64) -> Self {
        Self {
            id,
            offset: Some(offset),
            size,
            alignment: 0,
            padding: 0,
        }
    }

    pub fn auto(id: ComponentId, size: u64, alignment: u64) -> Self {
        Self {
            id,
            offset: None,
            size,
            alignment,
            padding: 0,
        }
    }

    /// One past the last byte covered by the component and its padding.
    /// Only meaningful once the component is placed.
    fn padded_end(&self) -> u64 {
        self.offset.unwrap_or(0) + self.size + self.padding
    }

    fn overlaps(&self, other: &ImageComponent) -> bool {
        match (self.offset, other.offset) {
            (Some(a), Some(b)) => self.padded_end() > b && other.padded_end() > a,
            _ => false,
        }
    }
}

fn round_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// The ordered component set for one build.
///
/// Lifecycle: template construction, size fill-in during parsing, a single
/// [`LayoutPlan::resolve`] pass, then read-only consumption by the header
/// synthesizer. Resolving an already resolved plan is a no-op.
#[derive(Clone, Debug, Default)]
pub struct LayoutPlan {
    components: Vec<ImageComponent>,
}

impl LayoutPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, component: ImageComponent) {
        self.components.push(component);
    }

    pub fn components(&self) -> &[ImageComponent] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [ImageComponent] {
        &mut self.components
    }

    pub fn get(&self, id: ComponentId) -> Option<&ImageComponent> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn offset_of(&self, id: ComponentId) -> Option<u64> {
        self.get(id).and_then(|c| c.offset)
    }

    /// Places `component` after the highest-offset component already in the
    /// plan, honoring its alignment. Used for the trailing application
    /// header and payload, which must stay at the very end of the image.
    pub fn append(&mut self, mut component: ImageComponent) -> u64 {
        let end = self
            .components
            .iter()
            .map(ImageComponent::padded_end)
            .max()
            .unwrap_or(0);
        let offset = round_up(end, component.alignment);
        component.offset = Some(offset);
        self.components.push(component);
        offset
    }

    /// Assigns an offset to every auto-positioned component and returns the
    /// total size covered by the plan.
    ///
    /// Components are visited in ascending-offset order, auto components
    /// last (declaration order breaks ties). Each auto component takes the
    /// first gap between already placed components that fits it, or failing
    /// that goes after the highest placed component. Two fixed components
    /// that overlap are a configuration error no placement can fix.
    pub fn resolve(&mut self) -> Result<u64, LayoutError> {
        self.check_fixed_overlaps()?;

        // Fixed offsets first, in ascending order; auto components keep
        // their declaration order at the tail.
        self.components
            .sort_by_key(|c| c.offset.unwrap_or(u64::MAX));

        for index in 0..self.components.len() {
            if self.components[index].offset.is_some() {
                continue;
            }

            if index == 0 {
                self.components[0].offset = Some(0);
                continue;
            }

            // Look for an empty spot between existing placements.
            for prev in 1..index {
                let candidate = self.place_after(prev - 1, index);
                self.components[index].offset = Some(candidate);

                if self.components[index].overlaps(&self.components[prev])
                    || self.components[index].overlaps(&self.components[prev - 1])
                {
                    self.components[index].offset = None;
                    continue;
                }

                break;
            }

            if self.components[index].offset.is_some() {
                // Keep the placed prefix sorted so later gap scans see a
                // consistent ascending order.
                self.components[..=index]
                    .sort_by_key(|c| c.offset.unwrap_or(u64::MAX));
                continue;
            }

            let offset = self.place_after(index - 1, index);
            self.components[index].offset = Some(offset);
        }

        for component in &self.components {
            debug!(
                "layout: {:?} at {:#x}, {:#x} bytes",
                component.id,
                component.offset.unwrap_or(0),
                component.size
            );
        }

        Ok(self
            .components
            .iter()
            .map(ImageComponent::padded_end)
            .max()
            .unwrap_or(0))
    }

    /// Tentative offset for `index` directly after `prev`, honoring the
    /// alignment of `index` and the trailing padding of `prev`.
    fn place_after(&self, prev: usize, index: usize) -> u64 {
        round_up(
            self.components[prev].padded_end(),
            self.components[index].alignment,
        )
    }

    /// Two components whose offsets are both mandated cannot be moved; if
    /// their data ranges collide the configuration itself is wrong. Padding
    /// is ignored here: it only constrains where new components may go.
    fn check_fixed_overlaps(&self) -> Result<(), LayoutError> {
        for (i, a) in self.components.iter().enumerate() {
            for b in &self.components[i + 1..] {
                let (Some(a_offset), Some(b_offset)) = (a.offset, b.offset) else {
                    continue;
                };
                if a_offset + a.size > b_offset && b_offset + b.size > a_offset {
                    return Err(LayoutError::Overlap {
                        a_offset,
                        a_size: a.size,
                        b_offset,
                        b_size: b.size,
                    });
                }
            }
        }
        Ok(())
    }
}
