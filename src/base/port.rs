/// `Port` models a single-entry IO channel between two components.  A `put`
/// onto a channel that still holds an unconsumed value fails, which is how
/// back-pressure propagates from a consumer to its producer.
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, RwLock};

#[derive(Default)]
pub struct InputPort {}

#[derive(Default)]
pub struct OutputPort {}

#[derive(Default)]
struct Channel<T: Clone> {
    valid: bool,
    data: T,
}

/// Wrapper type of a reference to a channel.  Newtype is necessary to
/// implement get/put methods at the reference type.
pub struct ChannelRef<T: Clone>(Arc<RwLock<Channel<T>>>);

#[derive(Default)]
pub struct Port<D, T: Clone> {
    // RwLock is necessary because each component has no knowledge of when the
    // other component will do concurrent access to the port.
    lock: OnceLock<ChannelRef<T>>,
    direction: PhantomData<D>,
}

impl<D, T: Default + Clone> Port<D, T> {
    pub fn new() -> Self {
        Port {
            lock: OnceLock::new(),
            direction: PhantomData,
        }
    }

    pub fn valid(&self) -> bool {
        self.lock.get().expect("port lock not set").valid()
    }
}

impl<T: Default + Clone> Port<OutputPort, T> {
    pub fn blocked(&self) -> bool {
        self.valid()
    }

    /// Offer a value to the channel from within the module that owns the
    /// port.  Returns false if the consumer has not drained the previous one.
    pub fn put(&mut self, data: &T) -> bool {
        self.lock.get().expect("port lock not set").put(data)
    }
}

impl<T: Default + Clone> Port<InputPort, T> {
    pub fn peek(&self) -> Option<T> {
        self.lock.get().expect("port lock not set").peek()
    }

    /// Consume the channel value, freeing it for the next `put`.
    pub fn get(&mut self) -> Option<T> {
        self.lock.get().expect("port lock not set").get()
    }
}

impl<T: Clone> ChannelRef<T> {
    pub fn valid(&self) -> bool {
        self.0.read().expect("rw lock poisoned").valid
    }

    pub fn peek(&self) -> Option<T> {
        let channel = self.0.read().expect("rw lock poisoned");
        channel.valid.then_some(channel.data.clone())
    }

    pub fn put(&self, data: &T) -> bool {
        if self.valid() {
            return false;
        }
        let mut channel = self.0.write().expect("rw lock poisoned");
        channel.valid = true;
        channel.data = data.clone();
        true
    }

    pub fn get(&self) -> Option<T> {
        let mut channel = self.0.write().expect("rw lock poisoned");
        match channel.valid {
            false => None,
            true => {
                channel.valid = false;
                Some(channel.data.clone())
            }
        }
    }
}

/// Transfers data from an output port to an input port of the same type, by
/// giving them the same valid and data pointer.
pub fn link<T: Default + Clone>(
    a: &mut Port<InputPort, T>,
    b: &mut Port<OutputPort, T>,
) -> ChannelRef<T> {
    let lock = Arc::new(RwLock::new(Channel::<T> {
        valid: false,
        data: T::default(),
    }));
    a.lock
        .set(ChannelRef(Arc::clone(&lock)))
        .map_err(|_| "")
        .expect("lock already set");
    b.lock
        .set(ChannelRef(Arc::clone(&lock)))
        .map_err(|_| "")
        .expect("lock already set");
    ChannelRef(lock)
}

/// Tie an output port off without connecting it to an input port.
pub fn tie_off<T: Default + Clone>(a: &mut Port<OutputPort, T>) -> ChannelRef<T> {
    let lock = Arc::new(RwLock::new(Channel::<T> {
        valid: false,
        data: T::default(),
    }));
    a.lock
        .set(ChannelRef(Arc::clone(&lock)))
        .map_err(|_| "")
        .expect("lock already set");
    ChannelRef(lock)
}
