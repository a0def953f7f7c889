//! Plain consensus parameter structs. No config-file or CLI layer exists at this layer; a host
//! assembles one of these from whatever configuration source it has and passes it by value.

#[derive(Clone, Debug)]
pub struct Deployment {
    pub bit: u8,
    pub start_time: u32,
    pub timeout: u32,
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub pow_limit: [u8; 32],
    pub pow_target_spacing: u64,
    pub pow_target_timespan: u64,
    pub pow_allow_min_difficulty_blocks: bool,
    pub pow_no_retargeting: bool,
    pub cash_hard_fork_activation_time: u32,

    pub miner_confirmation_window: u32,
    pub rule_change_activation_threshold: u32,
    pub deployments: Vec<Deployment>,
}

impl ConsensusParams {
    pub fn difficulty_adjustment_interval(&self) -> u32 {
        (self.pow_target_timespan / self.pow_target_spacing) as u32
    }
}
