//! Pure decision makers: NO I/O, NO async, just a synchronous transform from
//! an event to an optional command.

pub trait Machine {
    type Event;
    type Command;

    fn decide(&mut self, event: &Self::Event) -> Option<Self::Command>;
}
