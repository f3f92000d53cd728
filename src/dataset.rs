use std::collections::VecDeque;
use std::iter::Fuse;
use std::panic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, sync_channel};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

pub type BoxedIter<T> = Box<dyn Iterator<Item = T> + Send>;

type IterFactory<T> = dyn Fn() -> BoxedIter<T> + Send + Sync;

/// A re-iterable record stream backed by a factory of iterators. Every call
/// to [`Dataset::iter`] starts a fresh pass over the elements.
pub struct Dataset<T> {
    factory: Arc<IterFactory<T>>,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Dataset {
            factory: Arc::clone(&self.factory),
        }
    }
}

/// Number of elements mapped concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// One in-flight element per rayon worker thread.
    Auto,
    Fixed(usize),
}

impl Parallelism {
    pub fn degree(self) -> usize {
        match self {
            Parallelism::Auto => rayon::current_num_threads(),
            Parallelism::Fixed(n) => n.max(1),
        }
    }
}

impl From<Option<usize>> for Parallelism {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Parallelism::Auto, Parallelism::Fixed)
    }
}

impl<T: Send + 'static> Dataset<T> {
    pub fn from_fn<F>(factory: F) -> Dataset<T>
    where
        F: Fn() -> BoxedIter<T> + Send + Sync + 'static,
    {
        Dataset {
            factory: Arc::new(factory),
        }
    }

    pub fn from_vec(elements: Vec<T>) -> Dataset<T>
    where
        T: Clone + Sync,
    {
        let elements = Arc::new(elements);
        Dataset::from_fn(move || {
            let elements = Arc::clone(&elements);
            Box::new((0..elements.len()).map(move |i| elements[i].clone()))
        })
    }

    /// Starts a new pass over the elements.
    pub fn iter(&self) -> BoxedIter<T> {
        (self.factory)()
    }

    pub fn map<U, F>(self, f: F) -> Dataset<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Dataset::from_fn(move || {
            let f = Arc::clone(&f);
            Box::new(self.iter().map(move |x| f(x)))
        })
    }

    /// Maps elements on the rayon pool, keeping input order.
    pub fn par_map<U, F>(self, f: F, parallelism: Parallelism) -> Dataset<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let degree = parallelism.degree();
        Dataset::from_fn(move || {
            Box::new(ParMapIter {
                source: self.iter(),
                f: Arc::clone(&f),
                degree,
                ready: VecDeque::with_capacity(degree),
            })
        })
    }

    /// Buffered shuffle: keeps `buffer_size` elements and emits a uniformly
    /// chosen one, refilling from the source.
    pub fn shuffle(self, buffer_size: usize, reshuffle_each_iteration: bool, seed: Option<u64>) -> Dataset<T> {
        let base_seed = seed.unwrap_or_else(rand::random);
        let epoch = AtomicU64::new(0);
        let buffer_size = buffer_size.max(1);
        Dataset::from_fn(move || {
            let seed = if reshuffle_each_iteration {
                base_seed.wrapping_add(epoch.fetch_add(1, Ordering::Relaxed))
            } else {
                base_seed
            };
            Box::new(ShuffleIter {
                source: self.iter(),
                buffer: Vec::with_capacity(buffer_size),
                buffer_size,
                filled: false,
                rng: ChaCha8Rng::seed_from_u64(seed),
            })
        })
    }

    /// Repeats the elements `count` times, or forever when `count` is `None`.
    pub fn repeat(self, count: Option<usize>) -> Dataset<T> {
        Dataset::from_fn(move || {
            if count == Some(0) {
                return Box::new(std::iter::empty());
            }
            Box::new(RepeatIter {
                dataset: self.clone(),
                current: self.iter(),
                remaining: count.map(|c| c - 1),
                yielded: false,
            })
        })
    }

    /// Produces elements on a background thread, keeping up to `buffer_size`
    /// of them ready.
    pub fn prefetch(self, buffer_size: usize) -> Dataset<T> {
        let buffer_size = buffer_size.max(1);
        Dataset::from_fn(move || {
            let (tx, rx) = sync_channel(buffer_size);
            let source = self.iter();
            let producer = thread::spawn(move || {
                for element in source {
                    if tx.send(element).is_err() {
                        log::trace!("prefetch consumer dropped");
                        break;
                    }
                }
            });
            Box::new(PrefetchIter {
                rx,
                producer: Some(producer),
            })
        })
    }

    pub fn take(self, n: usize) -> Dataset<T> {
        Dataset::from_fn(move || Box::new(self.iter().take(n)))
    }
}

impl<T: Send + 'static, E: Send + 'static> Dataset<std::result::Result<T, E>> {
    /// Groups consecutive `Ok` elements into chunks of `size`. `Err` elements
    /// are yielded on their own as they arrive and do not count toward a
    /// chunk. The last chunk may be shorter unless `drop_remainder` is set.
    pub fn try_chunks(self, size: usize, drop_remainder: bool) -> Dataset<std::result::Result<Vec<T>, E>> {
        let size = size.max(1);
        Dataset::from_fn(move || {
            Box::new(TryChunksIter {
                source: self.iter().fuse(),
                chunk: Vec::with_capacity(size),
                size,
                drop_remainder,
            })
        })
    }
}

struct TryChunksIter<T, E> {
    source: Fuse<BoxedIter<std::result::Result<T, E>>>,
    chunk: Vec<T>,
    size: usize,
    drop_remainder: bool,
}

impl<T, E> Iterator for TryChunksIter<T, E> {
    type Item = std::result::Result<Vec<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.source.next() {
                Some(Ok(element)) => {
                    self.chunk.push(element);
                    if self.chunk.len() == self.size {
                        return Some(Ok(std::mem::take(&mut self.chunk)));
                    }
                }
                Some(Err(err)) => return Some(Err(err)),
                None => {
                    if self.chunk.is_empty() || (self.drop_remainder && self.chunk.len() < self.size) {
                        self.chunk.clear();
                        return None;
                    }
                    return Some(Ok(std::mem::take(&mut self.chunk)));
                }
            }
        }
    }
}

struct ParMapIter<T, U, F> {
    source: BoxedIter<T>,
    f: Arc<F>,
    degree: usize,
    ready: VecDeque<U>,
}

impl<T, U, F> Iterator for ParMapIter<T, U, F>
where
    T: Send,
    U: Send,
    F: Fn(T) -> U + Send + Sync,
{
    type Item = U;

    fn next(&mut self) -> Option<U> {
        if self.ready.is_empty() {
            let pending: Vec<T> = self.source.by_ref().take(self.degree).collect();
            if pending.is_empty() {
                return None;
            }
            let f = self.f.as_ref();
            let mapped: Vec<U> = pending.into_par_iter().map(|x| f(x)).collect();
            self.ready.extend(mapped);
        }
        self.ready.pop_front()
    }
}

struct ShuffleIter<T> {
    source: BoxedIter<T>,
    buffer: Vec<T>,
    buffer_size: usize,
    filled: bool,
    rng: ChaCha8Rng,
}

impl<T> Iterator for ShuffleIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if !self.filled {
            self.buffer.extend(self.source.by_ref().take(self.buffer_size));
            self.filled = true;
        }
        if self.buffer.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..self.buffer.len());
        let element = self.buffer.swap_remove(idx);
        if let Some(next) = self.source.next() {
            self.buffer.push(next);
        }
        Some(element)
    }
}

struct RepeatIter<T> {
    dataset: Dataset<T>,
    current: BoxedIter<T>,
    /// Passes left after the current one; `None` repeats forever.
    remaining: Option<usize>,
    yielded: bool,
}

impl<T: Send + 'static> Iterator for RepeatIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            if let Some(element) = self.current.next() {
                self.yielded = true;
                return Some(element);
            }
            // An empty pass would otherwise spin forever.
            if !self.yielded {
                return None;
            }
            match self.remaining {
                Some(0) => return None,
                Some(n) => self.remaining = Some(n - 1),
                None => {}
            }
            self.current = self.dataset.iter();
            self.yielded = false;
        }
    }
}

struct PrefetchIter<T> {
    rx: Receiver<T>,
    producer: Option<JoinHandle<()>>,
}

impl<T> Iterator for PrefetchIter<T> {
    type Item = T;

    /// A panic in the producer is re-raised once its buffered elements are
    /// drained, instead of ending the pass early.
    fn next(&mut self) -> Option<T> {
        match self.rx.recv() {
            Ok(element) => Some(element),
            Err(_) => {
                if let Some(Err(payload)) = self.producer.take().map(JoinHandle::join) {
                    panic::resume_unwind(payload);
                }
                None
            }
        }
    }
}

/// Iterator adapter that can inspect its first element without consuming it.
///
/// The peeked element stays buffered and is yielded first.
pub struct Lookahead<I: Iterator> {
    inner: I,
    buffered: Option<I::Item>,
}

impl<I: Iterator> Lookahead<I> {
    pub fn new(inner: I) -> Lookahead<I> {
        Lookahead { inner, buffered: None }
    }

    pub fn peek(&mut self) -> Option<&I::Item> {
        if self.buffered.is_none() {
            self.buffered = self.inner.next();
        }
        self.buffered.as_ref()
    }
}

impl<I: Iterator> Iterator for Lookahead<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        self.buffered.take().or_else(|| self.inner.next())
    }
}
