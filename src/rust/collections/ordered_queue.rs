// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::collections::VecDeque;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Elements that can be placed on an [OrderedQueue].
pub trait Aged {
    /// Identifier used to look elements up.
    type Id: PartialEq + Copy;

    /// Returns the key this element is ordered by. Lower keys come out first.
    fn age(&self) -> u64;

    /// Returns the identifier of this element.
    fn id(&self) -> Self::Id;
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// A queue kept sorted in ascending age. Elements with equal age come out in insertion order.
pub struct OrderedQueue<T: Aged> {
    elements: VecDeque<T>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T: Aged> OrderedQueue<T> {
    pub fn new() -> Self {
        Self {
            elements: VecDeque::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Inserts `element` after every element whose age is less than or equal to its own.
    pub fn push(&mut self, element: T) {
        let age: u64 = element.age();
        let position: usize = self.elements.partition_point(|other| other.age() <= age);
        self.elements.insert(position, element);
    }

    /// Removes the element with the lowest age.
    pub fn pop_front(&mut self) -> Option<T> {
        self.elements.pop_front()
    }

    /// Peeks at the element with the lowest age.
    pub fn front(&self) -> Option<&T> {
        self.elements.front()
    }

    /// Unlinks the element identified by `id`.
    pub fn remove_by_id(&mut self, id: T::Id) -> Option<T> {
        let position: usize = self.elements.iter().position(|element| element.id() == id)?;
        self.elements.remove(position)
    }

    pub fn contains(&self, id: T::Id) -> bool {
        self.elements.iter().any(|element| element.id() == id)
    }

    /// Iterates over the elements in the order they would be popped.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T: Aged> Default for OrderedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Aged + ?Sized> Aged for Box<T> {
    type Id = T::Id;

    fn age(&self) -> u64 {
        self.as_ref().age()
    }

    fn id(&self) -> Self::Id {
        self.as_ref().id()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
