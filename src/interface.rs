use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum InterfaceMode {
    #[default]
    Remote,
    Simulation,
}

impl InterfaceMode {
    pub const fn default_baud(self) -> u32 {
        match self {
            Self::Remote | Self::Simulation => 9_600,
        }
    }
}
