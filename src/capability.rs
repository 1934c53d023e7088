//! Capability slots and the per-request registry that resolves them.
//!
//! Requirements are tracked in the type of an effect as a [`Caps`] set with one marker per
//! slot, either [`Needed`] or [`Free`]. Sequencing takes the union of two sets, providing a
//! slot discharges it, and a runner only accepts an effect whose set is a subset of what its
//! invocation kind supplies. The [`Registry`] is the runtime side: a map from slot to handle,
//! built fresh for every request and threaded through evaluation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::store::{AuthHandle, BlobReader, BlobWriter, DatabaseReader, DatabaseWriter, SchedulerHandle};

// ------------- Markers -------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Needed;

#[derive(Debug, Clone, Copy, Default)]
pub struct Free;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Needed {}
    impl Sealed for super::Free {}
}

pub trait Flag: sealed::Sealed + Send + Sync + 'static {
    const NEEDED: bool;
}

impl Flag for Needed {
    const NEEDED: bool = true;
}
impl Flag for Free {
    const NEEDED: bool = false;
}

/// Logical or of two markers.
pub trait Either<Rhs: Flag>: Flag {
    type Output: Flag;
}

impl<Rhs: Flag> Either<Rhs> for Needed {
    type Output = Needed;
}
impl<Rhs: Flag> Either<Rhs> for Free {
    type Output = Rhs;
}

/// `Self` supplies at least what `Sub` asks for.
pub trait Covers<Sub: Flag>: Flag {}

impl Covers<Free> for Free {}
impl Covers<Free> for Needed {}
impl Covers<Needed> for Needed {}

// ------------- Sets -------------

/// A capability set: database read, database write, scheduler, blob read, blob write, identity.
pub struct Caps<Rd, Wr, Sch, BlobRd, BlobWr, Ident>(PhantomData<fn() -> (Rd, Wr, Sch, BlobRd, BlobWr, Ident)>);

pub trait CapSet: Send + Sync + 'static {
    /// Names of the slots this set requires.
    fn needed() -> Vec<&'static str>;
}

impl<Rd: Flag, Wr: Flag, Sch: Flag, BlobRd: Flag, BlobWr: Flag, Ident: Flag> CapSet
    for Caps<Rd, Wr, Sch, BlobRd, BlobWr, Ident>
{
    fn needed() -> Vec<&'static str> {
        let slots = [
            (Rd::NEEDED, DbRead::NAME),
            (Wr::NEEDED, DbWrite::NAME),
            (Sch::NEEDED, Schedule::NAME),
            (BlobRd::NEEDED, BlobRead::NAME),
            (BlobWr::NEEDED, BlobWrite::NAME),
            (Ident::NEEDED, Identity::NAME),
        ];
        slots.into_iter().filter(|(needed, _)| *needed).map(|(_, name)| name).collect()
    }
}

pub type NoCaps = Caps<Free, Free, Free, Free, Free, Free>;
pub type NeedsRead = Caps<Needed, Free, Free, Free, Free, Free>;
pub type NeedsWrite = Caps<Free, Needed, Free, Free, Free, Free>;
pub type NeedsScheduler = Caps<Free, Free, Needed, Free, Free, Free>;
pub type NeedsBlobRead = Caps<Free, Free, Free, Needed, Free, Free>;
pub type NeedsBlobWrite = Caps<Free, Free, Free, Free, Needed, Free>;
pub type NeedsIdentity = Caps<Free, Free, Free, Free, Free, Needed>;

/// What a query invocation supplies.
pub type QueryCaps = Caps<Needed, Free, Free, Needed, Free, Needed>;
/// What a mutation invocation supplies.
pub type MutationCaps = Caps<Needed, Needed, Needed, Needed, Needed, Needed>;
/// What an action invocation supplies; actions have no direct database access.
pub type ActionCaps = Caps<Free, Free, Needed, Needed, Needed, Needed>;

pub trait Union<Rhs: CapSet>: CapSet {
    type Output: CapSet;
}

impl<R1, W1, S1, BR1, BW1, I1, R2, W2, S2, BR2, BW2, I2> Union<Caps<R2, W2, S2, BR2, BW2, I2>>
    for Caps<R1, W1, S1, BR1, BW1, I1>
where
    R1: Either<R2>,
    W1: Either<W2>,
    S1: Either<S2>,
    BR1: Either<BR2>,
    BW1: Either<BW2>,
    I1: Either<I2>,
    R2: Flag,
    W2: Flag,
    S2: Flag,
    BR2: Flag,
    BW2: Flag,
    I2: Flag,
{
    type Output = Caps<
        <R1 as Either<R2>>::Output,
        <W1 as Either<W2>>::Output,
        <S1 as Either<S2>>::Output,
        <BR1 as Either<BR2>>::Output,
        <BW1 as Either<BW2>>::Output,
        <I1 as Either<I2>>::Output,
    >;
}

/// Union of two capability sets.
pub type Both<L, R> = <L as Union<R>>::Output;

pub trait SubsetOf<Super: CapSet>: CapSet {}

impl<R1, W1, S1, BR1, BW1, I1, R2, W2, S2, BR2, BW2, I2> SubsetOf<Caps<R2, W2, S2, BR2, BW2, I2>>
    for Caps<R1, W1, S1, BR1, BW1, I1>
where
    R1: Flag,
    W1: Flag,
    S1: Flag,
    BR1: Flag,
    BW1: Flag,
    I1: Flag,
    R2: Covers<R1>,
    W2: Covers<W1>,
    S2: Covers<S1>,
    BR2: Covers<BR1>,
    BW2: Covers<BW1>,
    I2: Covers<I1>,
{
}

// ------------- Slots -------------

/// A named slot a computation can require and a runner (or `provide`) can fill.
pub trait Capability: 'static {
    type Handle: ?Sized + Send + Sync + 'static;
    /// The set containing only this slot.
    type Requires: CapSet;
    const NAME: &'static str;
}

/// Removes slot `C` from a set.
pub trait Discharge<C: Capability>: CapSet {
    type Output: CapSet;
}

macro_rules! slot {
    ($slot:ident, $handle:ty, $requires:ty, $name:literal, [$($before:ident),*], $at:ident, [$($after:ident),*]) => {
        pub struct $slot;

        impl Capability for $slot {
            type Handle = $handle;
            type Requires = $requires;
            const NAME: &'static str = $name;
        }

        impl<$($before: Flag,)* $at: Flag, $($after: Flag),*> Discharge<$slot> for Caps<$($before,)* $at, $($after),*> {
            type Output = Caps<$($before,)* Free, $($after),*>;
        }
    };
}

slot!(DbRead, dyn DatabaseReader, NeedsRead, "db.read", [], Rd, [Wr, Sch, BlobRd, BlobWr, Ident]);
slot!(DbWrite, dyn DatabaseWriter, NeedsWrite, "db.write", [Rd], Wr, [Sch, BlobRd, BlobWr, Ident]);
slot!(Schedule, dyn SchedulerHandle, NeedsScheduler, "scheduler", [Rd, Wr], Sch, [BlobRd, BlobWr, Ident]);
slot!(BlobRead, dyn BlobReader, NeedsBlobRead, "storage.read", [Rd, Wr, Sch], BlobRd, [BlobWr, Ident]);
slot!(BlobWrite, dyn BlobWriter, NeedsBlobWrite, "storage.write", [Rd, Wr, Sch, BlobRd], BlobWr, [Ident]);
slot!(Identity, dyn AuthHandle, NeedsIdentity, "auth", [Rd, Wr, Sch, BlobRd, BlobWr], Ident, []);

// ------------- Registry -------------

/// Handles available to one evaluation, keyed by slot.
#[derive(Clone, Default)]
pub struct Registry {
    slots: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this registry with `C` resolving to `handle`.
    pub fn with<C: Capability>(&self, handle: Arc<C::Handle>) -> Self {
        let mut slots = (*self.slots).clone();
        slots.insert(TypeId::of::<C>(), Arc::new(handle));
        Self { slots: Arc::new(slots) }
    }

    pub fn resolve<C: Capability>(&self) -> Option<Arc<C::Handle>> {
        self.slots
            .get(&TypeId::of::<C>())
            .and_then(|slot| slot.downcast_ref::<Arc<C::Handle>>())
            .cloned()
    }

    pub fn contains<C: Capability>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<C>())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("slots", &self.slots.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_subset<Sub: SubsetOf<Super>, Super: CapSet>() {}

    #[test]
    fn union_keeps_every_needed_slot() {
        assert_eq!(<Both<NeedsRead, NeedsWrite> as CapSet>::needed(), vec!["db.read", "db.write"]);
        assert_eq!(<Both<NoCaps, NoCaps> as CapSet>::needed(), Vec::<&str>::new());
        assert_eq!(<Both<NeedsIdentity, NeedsIdentity> as CapSet>::needed(), vec!["auth"]);
    }

    #[test]
    fn discharge_removes_one_slot() {
        type ReadWrite = Both<NeedsRead, NeedsWrite>;
        assert_eq!(<<ReadWrite as Discharge<DbWrite>>::Output as CapSet>::needed(), vec!["db.read"]);
        assert_eq!(<<NeedsRead as Discharge<DbRead>>::Output as CapSet>::needed(), Vec::<&str>::new());
    }

    #[test]
    fn invocation_kinds_supply_expected_slots() {
        assert_subset::<NoCaps, QueryCaps>();
        assert_subset::<NeedsRead, QueryCaps>();
        assert_subset::<Both<NeedsRead, NeedsIdentity>, QueryCaps>();
        assert_subset::<Both<NeedsWrite, NeedsScheduler>, MutationCaps>();
        assert_subset::<NeedsBlobWrite, ActionCaps>();
        assert_eq!(<ActionCaps as CapSet>::needed(), vec!["scheduler", "storage.read", "storage.write", "auth"]);
    }

    #[test]
    fn registry_copies_are_independent() {
        struct Nobody;
        impl AuthHandle for Nobody {
            fn user_identity(&self) -> futures_util::future::BoxFuture<'_, Result<Option<crate::store::UserIdentity>, crate::error::StoreError>> {
                Box::pin(async { Ok(None) })
            }
        }
        let base = Registry::new();
        let scoped = base.with::<Identity>(Arc::new(Nobody));
        assert!(base.is_empty());
        assert!(scoped.contains::<Identity>());
        assert!(scoped.resolve::<Identity>().is_some());
        assert!(scoped.resolve::<DbRead>().is_none());
    }
}
