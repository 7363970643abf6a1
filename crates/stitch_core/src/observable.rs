use std::fmt;

/// Handle returned by [`Observable::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Box<dyn FnMut(&T, &T) + Send>;

/// A single owned value with change notification.
///
/// Listeners run synchronously inside [`Observable::set`]/[`Observable::update`],
/// in subscription order, and only when the new value differs from the old one.
/// Each listener receives `(previous, current)`.
pub struct Observable<T> {
    value: T,
    listeners: Vec<(ListenerId, Listener<T>)>,
    next_id: u64,
}

impl<T: Clone + PartialEq> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&T, &T) + Send + 'static) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Subscribe and deliver the current value right away, as if it had just changed
    /// from `initial`.
    pub fn subscribe_immediate(
        &mut self,
        initial: T,
        mut listener: impl FnMut(&T, &T) + Send + 'static,
    ) -> ListenerId {
        if initial != self.value {
            listener(&initial, &self.value);
        }
        self.subscribe(listener)
    }

    /// Returns false when no listener with that id was registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Replace the value. Returns true when it changed (and listeners ran).
    pub fn set(&mut self, value: T) -> bool {
        if value == self.value {
            return false;
        }
        let previous = std::mem::replace(&mut self.value, value);
        for (_, listener) in self.listeners.iter_mut() {
            listener(&previous, &self.value);
        }
        true
    }

    /// Apply `f` to a copy of the value and store the result.
    pub fn update(&mut self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.value.clone();
        f(&mut next);
        self.set(next)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.value)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
