mod approval;
mod balance;
mod mock;
mod network;
