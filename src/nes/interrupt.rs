#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    None,
    IrqBrk,
    Nmi,
    Reset,
    // Retracts a pending NMI that has not been serviced yet.
    CancelNmi,
}

impl Interrupt {
    fn priority(self) -> u8 {
        match self {
            Interrupt::None | Interrupt::CancelNmi => 0,
            Interrupt::IrqBrk => 1,
            Interrupt::Nmi => 2,
            Interrupt::Reset => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InterruptLatch {
    pending: Interrupt,
}

impl Default for InterruptLatch {
    fn default() -> Self {
        Self {
            pending: Interrupt::None,
        }
    }
}

impl InterruptLatch {
    pub fn raise(&mut self, kind: Interrupt) {
        if kind == Interrupt::CancelNmi {
            if self.pending == Interrupt::Nmi {
                self.pending = Interrupt::None;
            }
            return;
        }
        if kind.priority() > self.pending.priority() {
            self.pending = kind;
        }
    }

    pub fn pending(&self) -> Interrupt {
        self.pending
    }

    pub fn take(&mut self) -> Interrupt {
        std::mem::replace(&mut self.pending, Interrupt::None)
    }
}
