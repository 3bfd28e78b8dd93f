pub mod udphandler;
