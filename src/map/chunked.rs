use log::debug;

use crate::map::PixelRect;
use crate::raster::Raster;

/// Whether a render pass keeps going after a yield point
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Discard the in-progress pass; a newer request supersedes it
    Cancel,
}

/// The host side of a render pass.
///
/// Rendering is single-threaded and cooperative: between chunks the engine
/// hands control back through [`RenderHost::yield_now`], where the host may
/// process pending input and ask for the pass to be cancelled.
pub trait RenderHost {
    /// Part of a back buffer changed. `buffer` is the raster being drawn and
    /// `rects` the regions touched since the previous notification.
    fn buffer_changed(&mut self, buffer: &Raster, rects: &[PixelRect]);

    /// Chunk boundary. The only point at which a pass can be suspended or cancelled.
    fn yield_now(&mut self) -> Flow {
        Flow::Continue
    }

    /// Progress of a long chunked draw
    fn progress(&mut self, _done: usize, _total: usize) {}
}

/// Host that ignores notifications and never cancels (snapshots, tests)
#[derive(Debug, Default)]
pub struct NullHost;

impl RenderHost for NullHost {
    fn buffer_changed(&mut self, _buffer: &Raster, _rects: &[PixelRect]) {}
}

/// Splits large feature collections into bounded chunks so no single
/// uninterrupted draw burst grows with the total feature count.
#[derive(Clone, Copy, Debug)]
pub struct ChunkedRenderer {
    pub chunk_size: usize,
    pub use_chunking: bool,
}

impl ChunkedRenderer {
    pub fn new(chunk_size: usize, use_chunking: bool) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            use_chunking,
        }
    }

    /// Draw `items` into `target` with `draw_chunk`, which returns the pixel
    /// rectangles it touched.
    ///
    /// With chunking on and more items than `chunk_size`, every chunk but the
    /// last is followed by a buffer-changed notification carrying the rectangles
    /// accumulated since the previous one, then a yield. The final chunk does
    /// not notify or yield. Returns [`Flow::Cancel`] if the host cancelled at a
    /// chunk boundary; the remaining chunks are not drawn.
    pub fn draw<T, F>(&self, items: &[T], target: &mut Raster, host: &mut dyn RenderHost, mut draw_chunk: F) -> Flow
    where
        F: FnMut(&mut Raster, &[T]) -> Vec<PixelRect>,
    {
        if items.is_empty() {
            return Flow::Continue;
        }
        if !self.use_chunking || items.len() <= self.chunk_size {
            draw_chunk(target, items);
            return Flow::Continue;
        }

        let total = items.len();
        let chunk_count = total.div_ceil(self.chunk_size);
        let mut dirty: Vec<PixelRect> = Vec::new();
        for (i, chunk) in items.chunks(self.chunk_size).enumerate() {
            dirty.extend(draw_chunk(target, chunk));
            let done = (i * self.chunk_size + chunk.len()).min(total);
            host.progress(done, total);
            if i + 1 == chunk_count {
                break;
            }
            host.buffer_changed(target, &coalesce(std::mem::take(&mut dirty)));
            if host.yield_now() == Flow::Cancel {
                debug!("chunked draw cancelled after chunk {} of {}", i + 1, chunk_count);
                return Flow::Cancel;
            }
        }
        Flow::Continue
    }
}

/// Merge rectangles into their union when there are many small ones, so a
/// notification never carries thousands of entries.
fn coalesce(rects: Vec<PixelRect>) -> Vec<PixelRect> {
    const MAX_RECTS: usize = 32;
    let mut rects: Vec<PixelRect> = rects.into_iter().filter(|r| !r.is_empty()).collect();
    if rects.len() <= MAX_RECTS {
        return rects;
    }
    let union = rects.iter().skip(1).fold(rects[0], |acc, r| acc.union(r));
    rects.clear();
    rects.push(union);
    rects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingHost {
        notifications: usize,
        yields: usize,
        cancel_after: Option<usize>,
        last_rects: Vec<PixelRect>,
    }

    impl RenderHost for CountingHost {
        fn buffer_changed(&mut self, _buffer: &Raster, rects: &[PixelRect]) {
            self.notifications += 1;
            self.last_rects = rects.to_vec();
        }

        fn yield_now(&mut self) -> Flow {
            self.yields += 1;
            match self.cancel_after {
                Some(n) if self.yields >= n => Flow::Cancel,
                _ => Flow::Continue,
            }
        }
    }

    fn run(n: usize, k: usize) -> (Vec<usize>, CountingHost) {
        let items: Vec<usize> = (0..n).collect();
        let mut seen = vec![0usize; n];
        let mut host = CountingHost::default();
        let mut target = Raster::new(1, 1);
        let flow = ChunkedRenderer::new(k, true).draw(&items, &mut target, &mut host, |_, chunk| {
            assert!(chunk.len() <= k);
            for &i in chunk {
                seen[i] += 1;
            }
            vec![PixelRect::new(chunk[0] as i32, 0, 1, 1)]
        });
        assert_eq!(flow, Flow::Continue);
        (seen, host)
    }

    #[test]
    fn test_every_feature_drawn_once_with_ceil_minus_one_notifications() {
        for (n, k) in [(10, 3), (9, 3), (1, 5), (5, 5), (6, 5), (100_000, 50_000), (100_001, 50_000)] {
            let (seen, host) = run(n, k);
            assert!(seen.iter().all(|&c| c == 1), "n={n} k={k}");
            assert_eq!(host.notifications, n.div_ceil(k) - 1, "n={n} k={k}");
            assert_eq!(host.yields, host.notifications);
        }
    }

    #[test]
    fn test_notification_carries_rects_since_previous() {
        let (_, host) = run(6, 2);
        assert_eq!(host.last_rects, vec![PixelRect::new(2, 0, 1, 1)]);
    }

    #[test]
    fn test_cancel_stops_at_chunk_boundary() {
        let items: Vec<usize> = (0..10).collect();
        let mut drawn = 0;
        let mut host = CountingHost {
            cancel_after: Some(2),
            ..Default::default()
        };
        let mut target = Raster::new(1, 1);
        let flow = ChunkedRenderer::new(3, true).draw(&items, &mut target, &mut host, |_, chunk| {
            drawn += chunk.len();
            Vec::new()
        });
        assert_eq!(flow, Flow::Cancel);
        assert_eq!(drawn, 6);
    }

    #[test]
    fn test_chunking_disabled_draws_in_one_burst() {
        let items: Vec<usize> = (0..10).collect();
        let mut bursts = 0;
        let mut host = CountingHost::default();
        let mut target = Raster::new(1, 1);
        ChunkedRenderer::new(3, false).draw(&items, &mut target, &mut host, |_, _| {
            bursts += 1;
            Vec::new()
        });
        assert_eq!(bursts, 1);
        assert_eq!(host.notifications, 0);
    }
}
