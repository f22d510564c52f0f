//! Binding for the on-chain score contract.
//!
//! Bound inline with `abigen!` rather than from a separate ABI file or
//! crate - this is the only place the binding is used.

use ethers::prelude::*;

abigen!(
    ScoreContract,
    r#"[
        function updatePlayerData(address player, uint256 scoreAmount, uint256 transactionAmount) external
        function hasRole(bytes32 role, address account) external view returns (bool)
        function GAME_ROLE() external view returns (bytes32)
    ]"#
);
