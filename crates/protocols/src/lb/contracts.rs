use alloy::sol;

sol! {
    #[sol(rpc)]
    interface ILBPair {
        function getActiveId() external view returns (uint24 activeId);
        function getReserves() external view returns (uint128 reserveX, uint128 reserveY);
        function getBin(uint24 id) external view returns (uint128 binReserveX, uint128 binReserveY);
        function getBinStep() external view returns (uint16 binStep);
        function getTokenX() external view returns (address tokenX);
        function getTokenY() external view returns (address tokenY);
        function totalSupply(uint256 id) external view returns (uint256);
        function balanceOf(address account, uint256 id) external view returns (uint256);
        function balanceOfBatch(address[] calldata accounts, uint256[] calldata ids) external view returns (uint256[] memory batchBalances);
        function isApprovedForAll(address owner, address spender) external view returns (bool);
        function approveForAll(address spender, bool approved) external;
    }
}

sol! {
    #[sol(rpc)]
    interface ILBRouter {
        struct LiquidityParameters {
            address tokenX;
            address tokenY;
            uint256 binStep;
            uint256 amountX;
            uint256 amountY;
            uint256 amountXMin;
            uint256 amountYMin;
            uint256 activeIdDesired;
            uint256 idSlippage;
            int256[] deltaIds;
            uint256[] distributionX;
            uint256[] distributionY;
            address to;
            address refundTo;
            uint256 deadline;
        }

        function addLiquidity(LiquidityParameters calldata liquidityParameters)
            external
            returns (
                uint256 amountXAdded,
                uint256 amountYAdded,
                uint256 amountXLeft,
                uint256 amountYLeft,
                uint256[] memory depositIds,
                uint256[] memory liquidityMinted
            );

        function removeLiquidity(
            address tokenX,
            address tokenY,
            uint16 binStep,
            uint256 amountXMin,
            uint256 amountYMin,
            uint256[] memory ids,
            uint256[] memory amounts,
            address to,
            uint256 deadline
        ) external returns (uint256 amountX, uint256 amountY);
    }
}

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}
